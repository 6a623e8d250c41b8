use serde::{Deserialize, Serialize};

/// Ordered fluency pipeline. Declaration order is pipeline order, so the
/// derived `Ord` is the progression order.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FluencyStage {
    #[default]
    #[serde(rename = "notStarted")]
    NotStarted,
    #[serde(rename = "learning")]
    Learning,
    #[serde(rename = "accuracyPractice")]
    AccuracyPractice,
    #[serde(rename = "fluency6Practice")]
    Fluency6Practice,
    #[serde(rename = "fluency3Practice")]
    Fluency3Practice,
    #[serde(rename = "fluency2Practice")]
    Fluency2Practice,
    #[serde(rename = "fluency1_5Practice")]
    Fluency1_5Practice,
    #[serde(rename = "fluency1Practice")]
    Fluency1Practice,
    #[serde(rename = "mastered")]
    Mastered,
    #[serde(rename = "automatic")]
    Automatic,
}

/// How a stage is drilled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PracticeMode {
    /// One long window, no yellow zone; any in-window correct answer counts.
    Accuracy,
    /// Score-graded countdown; only green-zone correct answers count.
    Timed,
}

const PIPELINE: [FluencyStage; 10] = [
    FluencyStage::NotStarted,
    FluencyStage::Learning,
    FluencyStage::AccuracyPractice,
    FluencyStage::Fluency6Practice,
    FluencyStage::Fluency3Practice,
    FluencyStage::Fluency2Practice,
    FluencyStage::Fluency1_5Practice,
    FluencyStage::Fluency1Practice,
    FluencyStage::Mastered,
    FluencyStage::Automatic,
];

impl FluencyStage {
    pub const ALL: [FluencyStage; 10] = PIPELINE;

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "notStarted",
            Self::Learning => "learning",
            Self::AccuracyPractice => "accuracyPractice",
            Self::Fluency6Practice => "fluency6Practice",
            Self::Fluency3Practice => "fluency3Practice",
            Self::Fluency2Practice => "fluency2Practice",
            Self::Fluency1_5Practice => "fluency1_5Practice",
            Self::Fluency1Practice => "fluency1Practice",
            Self::Mastered => "mastered",
            Self::Automatic => "automatic",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        PIPELINE.iter().copied().find(|stage| stage.as_str() == s)
    }

    fn position(&self) -> usize {
        *self as usize
    }

    /// The single next stage, `None` once the pipeline is exhausted.
    pub fn next(&self) -> Option<Self> {
        PIPELINE.get(self.position() + 1).copied()
    }

    pub fn is_terminal(&self) -> bool {
        self.next().is_none()
    }

    pub fn practice_mode(&self) -> Option<PracticeMode> {
        match self {
            Self::Learning | Self::AccuracyPractice => Some(PracticeMode::Accuracy),
            Self::Fluency6Practice
            | Self::Fluency3Practice
            | Self::Fluency2Practice
            | Self::Fluency1_5Practice
            | Self::Fluency1Practice => Some(PracticeMode::Timed),
            Self::NotStarted | Self::Mastered | Self::Automatic => None,
        }
    }

    pub fn is_practicable(&self) -> bool {
        self.practice_mode().is_some()
    }

    /// Nominal recall target in seconds for the timed stages.
    pub fn target_seconds(&self) -> Option<f64> {
        match self {
            Self::Fluency6Practice => Some(6.0),
            Self::Fluency3Practice => Some(3.0),
            Self::Fluency2Practice => Some(2.0),
            Self::Fluency1_5Practice => Some(1.5),
            Self::Fluency1Practice => Some(1.0),
            _ => None,
        }
    }
}

impl std::fmt::Display for FluencyStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
