use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ExpertiseResult<T> = Result<T, ExpertiseError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExpertiseErrorCategory {
    Success,
    ConfigurationError,
    ParseError,
    PairingError,
    ArtifactNotFound,
    ComparisonError,
    IoSystemError,
    InternalError,
}

impl ExpertiseErrorCategory {
    /// Process exit status for a run aborted with this category.
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::ConfigurationError => 2,
            Self::ParseError => 3,
            Self::PairingError => 4,
            Self::ArtifactNotFound => 5,
            Self::ComparisonError => 6,
            Self::IoSystemError => 7,
            Self::InternalError => 8,
        }
    }

    pub const fn category_name(self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::ConfigurationError => "ConfigurationError",
            Self::ParseError => "ParseError",
            Self::PairingError => "PairingError",
            Self::ArtifactNotFound => "ArtifactNotFound",
            Self::ComparisonError => "ComparisonError",
            Self::IoSystemError => "IoSystemError",
            Self::InternalError => "InternalError",
        }
    }

    pub const fn is_fatal(self) -> bool {
        !matches!(self, Self::Success)
    }
}

/// Error value shared by every layer of the expertise pipeline.
///
/// `code` is a stable dotted identifier (`PARSE.OOPS_JO`, `PAIRING.FIELDS`, ...)
/// that downstream tooling can match on without parsing the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpertiseError {
    category: ExpertiseErrorCategory,
    code: &'static str,
    message: String,
}

impl ExpertiseError {
    pub fn new(
        category: ExpertiseErrorCategory,
        code: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            code,
            message: message.into(),
        }
    }

    pub fn configuration(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(ExpertiseErrorCategory::ConfigurationError, code, message)
    }

    pub fn parse(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(ExpertiseErrorCategory::ParseError, code, message)
    }

    pub fn pairing(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(ExpertiseErrorCategory::PairingError, code, message)
    }

    pub fn artifact_not_found(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(ExpertiseErrorCategory::ArtifactNotFound, code, message)
    }

    pub fn comparison(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(ExpertiseErrorCategory::ComparisonError, code, message)
    }

    pub fn io_system(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(ExpertiseErrorCategory::IoSystemError, code, message)
    }

    pub fn internal(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(ExpertiseErrorCategory::InternalError, code, message)
    }

    pub const fn category(&self) -> ExpertiseErrorCategory {
        self.category
    }

    pub const fn code(&self) -> &'static str {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn exit_code(&self) -> i32 {
        self.category.exit_code()
    }

    /// Data-availability problems that `fatal_exceptions = false` may degrade
    /// into a warning plus a sentinel entry.
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self.category,
            ExpertiseErrorCategory::ParseError
                | ExpertiseErrorCategory::PairingError
                | ExpertiseErrorCategory::ArtifactNotFound
                | ExpertiseErrorCategory::ComparisonError
        )
    }

    pub fn diagnostic_line(&self) -> String {
        let severity = if self.category.is_fatal() {
            "ERROR"
        } else {
            "INFO"
        };
        format!("{}: [{}] {}", severity, self.code, self.message)
    }

    pub fn fatal_exit_line(&self) -> Option<String> {
        self.category
            .is_fatal()
            .then(|| format!("FATAL EXIT CODE: {}", self.exit_code()))
    }
}

impl Display for ExpertiseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] {}",
            self.category.category_name(),
            self.code,
            self.message
        )
    }
}

impl Error for ExpertiseError {}

#[cfg(test)]
mod tests {
    use super::{ExpertiseError, ExpertiseErrorCategory};

    #[test]
    fn categories_map_to_distinct_exit_codes() {
        let cases = [
            (ExpertiseErrorCategory::Success, 0),
            (ExpertiseErrorCategory::ConfigurationError, 2),
            (ExpertiseErrorCategory::ParseError, 3),
            (ExpertiseErrorCategory::PairingError, 4),
            (ExpertiseErrorCategory::ArtifactNotFound, 5),
            (ExpertiseErrorCategory::ComparisonError, 6),
            (ExpertiseErrorCategory::IoSystemError, 7),
            (ExpertiseErrorCategory::InternalError, 8),
        ];

        for (category, exit_code) in cases {
            assert_eq!(category.exit_code(), exit_code, "{}", category.category_name());
        }
        assert!(!ExpertiseErrorCategory::Success.is_fatal());
        assert!(ExpertiseErrorCategory::PairingError.is_fatal());
    }

    #[test]
    fn fatal_error_renders_diagnostic_lines() {
        let error = ExpertiseError::parse("PARSE.OOPS_JO", "Jo pattern not found in 'stdeo.0'");

        assert_eq!(error.exit_code(), 3);
        assert_eq!(
            error.diagnostic_line(),
            "ERROR: [PARSE.OOPS_JO] Jo pattern not found in 'stdeo.0'"
        );
        assert_eq!(
            error.fatal_exit_line().as_deref(),
            Some("FATAL EXIT CODE: 3")
        );
    }

    #[test]
    fn only_data_availability_errors_are_recoverable() {
        assert!(ExpertiseError::pairing("PAIRING.X", "no ref").is_recoverable());
        assert!(ExpertiseError::artifact_not_found("ARTIFACT.X", "gone").is_recoverable());
        assert!(!ExpertiseError::configuration("CONFIG.X", "bad").is_recoverable());
        assert!(!ExpertiseError::internal("INTERNAL.X", "bug").is_recoverable());
    }
}
