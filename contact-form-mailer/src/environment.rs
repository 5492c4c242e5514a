/// Source of the process configuration.
///
/// The handler reads every value through this trait at the step which needs it, so each
/// invocation sees the environment as it is at that moment and tests can substitute a fixed map.
pub trait Environment: Send + Sync {
    fn var(&self, key: &str) -> Option<String>;

    /// Returns the value of `key`, treating an empty value the same as an absent one.
    fn non_empty_var(&self, key: &str) -> Option<String> {
        self.var(key).filter(|value| !value.is_empty())
    }
}

#[derive(Clone, Copy, Default)]
pub struct ProcessEnvironment;

impl Environment for ProcessEnvironment {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}
