//! The single JSON line printed on stdout.

use serde::Serialize;
use stm_translate::RunReport;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Status {
    Success {
        success: u8,
        output: String,
        attributes: usize,
        objects: usize,
        galaxies: usize,
        skipped: usize,
    },
    Failure {
        success: u8,
        message: String,
    },
}

impl Status {
    #[must_use]
    pub fn success(output: impl Into<String>, report: &RunReport) -> Self {
        Self::Success {
            success: 1,
            output: output.into(),
            attributes: report.attributes,
            objects: report.objects,
            galaxies: report.galaxies,
            skipped: report.skipped(),
        }
    }

    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure {
            success: 0,
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// One-line JSON rendering.
    #[must_use]
    pub fn render(&self) -> String {
        // Only strings and integers; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_else(|_| String::from(r#"{"success":0}"#))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn success_line_carries_counts() {
        let report = RunReport {
            attributes: 3,
            objects: 2,
            galaxies: 1,
            ..RunReport::default()
        };
        let line = Status::success("a.json.stix2", &report).render();
        assert_eq!(
            line,
            r#"{"success":1,"output":"a.json.stix2","attributes":3,"objects":2,"galaxies":1,"skipped":0}"#
        );
    }

    #[test]
    fn failure_line_carries_message() {
        let status = Status::failure("no translatable objects in bundle");
        assert!(!status.is_success());
        assert_eq!(
            status.render(),
            r#"{"success":0,"message":"no translatable objects in bundle"}"#
        );
    }
}
