use std::fmt::Display;

/// `(count, "singular", "plural")`
pub struct SingularPlural(pub usize, pub &'static str, pub &'static str);

impl Display for SingularPlural {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", if self.0 == 1 { self.1 } else { self.2 })
    }
}

/// `(count, "singular", "plural")`
pub struct DisplayCountOf(pub usize, pub &'static str, pub &'static str);

impl Display for DisplayCountOf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.0, SingularPlural(self.0, self.1, self.2))
    }
}

pub struct DisplayServerCount(pub usize);

impl Display for DisplayServerCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", DisplayCountOf(self.0, "server", "servers"))
    }
}

pub(crate) fn log_error<E: Display>(err: E) {
    tracing::error!(name: crate::LOG_ONLY, "{err}")
}
