use kafkarator_apis::{Stream, Topic};
use kube::CustomResourceExt;
use serde_yaml;

pub fn main() {
    println!("{}", serde_yaml::to_string(&Topic::crd()).unwrap());
    println!("---");
    println!("{}", serde_yaml::to_string(&Stream::crd()).unwrap());
}
