pub mod groupme;
pub mod slack;

/// Both platforms send blank text as `""` or omit it; treat both as absent.
pub(crate) fn non_empty(text: Option<String>) -> Option<String> {
    text.filter(|t| !t.trim().is_empty())
}
