use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TestSection {
    Listening,
    Reading,
    Writing,
}

impl TestSection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestSection::Listening => "listening",
            TestSection::Reading => "reading",
            TestSection::Writing => "writing",
        }
    }
}

/// A completed practice test, stored as submitted
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestResult {
    pub id: Uuid,
    pub test_name: String,
    pub section: TestSection,
    pub score: u32,
    pub max_score: u32,
    pub duration_secs: u64,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResultRequest {
    pub test_name: String,
    pub section: TestSection,
    pub score: u32,
    pub max_score: u32,
    #[serde(default)]
    pub duration_secs: u64,
}

impl SubmitResultRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.test_name.trim().is_empty() {
            return Err("Test name is required".to_string());
        }
        if self.max_score == 0 {
            return Err("max_score must be greater than zero".to_string());
        }
        if self.score > self.max_score {
            return Err(format!(
                "score {} exceeds max_score {}",
                self.score, self.max_score
            ));
        }
        Ok(())
    }

    pub fn into_result(self, completed_at: DateTime<Utc>) -> TestResult {
        TestResult {
            id: Uuid::new_v4(),
            test_name: self.test_name.trim().to_string(),
            section: self.section,
            score: self.score,
            max_score: self.max_score,
            duration_secs: self.duration_secs,
            completed_at,
        }
    }
}
