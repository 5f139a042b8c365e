use serde::Serialize;

#[derive(Debug, Default, Serialize)]
pub struct IntegrityReport {
    pub checked: usize,
    pub passed: usize,
    pub failed: Vec<IntegrityFailure>,
}

#[derive(Debug, Serialize)]
pub struct IntegrityFailure {
    pub hash: String,
    pub reason: String,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_report_is_clean() {
        assert!(IntegrityReport::default().is_clean());
    }

    #[test]
    fn report_with_failure_is_not_clean() {
        let report = IntegrityReport {
            checked: 1,
            passed: 0,
            failed: vec![IntegrityFailure {
                hash: "abc".to_owned(),
                reason: "checksum mismatch".to_owned(),
            }],
        };
        assert!(!report.is_clean());
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("checksum mismatch"));
    }
}
