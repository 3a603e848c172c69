use ghostgate_types::Suggestion;

/// Decides whether a generated Suggestion is shown to the user.
///
/// Visibility only: a filter can delay when an Intent becomes VISIBLE, but
/// has no say in whether it may be confirmed or executed.
pub trait VisibilityFilter: Send + Sync {
    fn is_visible(&self, suggestion: &Suggestion) -> bool;
}

/// Shows suggestions whose confidence meets a threshold.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MinConfidence(pub f64);

impl MinConfidence {
    pub fn new(threshold: f64) -> Self {
        Self(threshold)
    }
}

impl VisibilityFilter for MinConfidence {
    fn is_visible(&self, suggestion: &Suggestion) -> bool {
        suggestion.confidence >= self.0
    }
}

impl<F> VisibilityFilter for F
where
    F: Fn(&Suggestion) -> bool + Send + Sync,
{
    fn is_visible(&self, suggestion: &Suggestion) -> bool {
        self(suggestion)
    }
}
