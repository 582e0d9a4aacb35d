use kube::Resource;

pub(crate) const REDACTED_MESSAGE: &'static str =
    "error message has been removed because it contains possible credentials";

const TRIGGER_WORDS: [&'static str; 6] = [
    "password",
    "token",
    "secret",
    "private key",
    "certificate",
    "avns_",
];

/// Replaces messages which look like they contain credentials.
pub(crate) fn check_for_possible_credentials(message: String) -> String {
    let lower = message.to_lowercase();
    if TRIGGER_WORDS.iter().any(|trigger| lower.contains(trigger)) {
        REDACTED_MESSAGE.to_string()
    } else {
        message
    }
}

/// Adds the finalizer unless present, returns whether it was added.
pub(crate) fn add_finalizer<T: Resource>(resource: &mut T, finalizer: &str) -> bool {
    let finalizers = resource.meta_mut().finalizers.get_or_insert_with(Vec::new);
    if finalizers.iter().any(|f| f.as_str() == finalizer) {
        false
    } else {
        finalizers.push(finalizer.to_string());
        true
    }
}

/// Removes the finalizer, returns whether it was present.
pub(crate) fn remove_finalizer<T: Resource>(resource: &mut T, finalizer: &str) -> bool {
    match resource.meta_mut().finalizers.as_mut() {
        Some(finalizers) => {
            let len = finalizers.len();
            finalizers.retain(|f| f != finalizer);
            finalizers.len() != len
        }
        None => false,
    }
}

pub(crate) fn has_finalizer<T: Resource>(resource: &T, finalizer: &str) -> bool {
    resource
        .meta()
        .finalizers
        .as_ref()
        .map_or(false, |f| f.iter().any(|f| f.as_str() == finalizer))
}

pub(crate) fn metric_name(name: &str) -> String {
    format!("kafkarator_{}", name)
}
