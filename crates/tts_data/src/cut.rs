use crate::error::DataModuleError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A `Cut` is one manifest-described segment of audio together with its
/// annotations. It is the atomic training example that samplers group into
/// batches.
///
/// The JSON layout follows the usual cut manifest format, e.g.
/// ```text
/// {"id": "utt-0001", "start": 0.0, "duration": 3.52, "channel": 0,
///  "supervisions": [{"id": "utt-0001", "recording_id": "rec-1", "start": 0.0,
///                    "duration": 3.52, "text": "hello world", "speaker": "spk1",
///                    "custom": {"tokens": ["h", "e", ...]}}],
///  "recording": {"id": "rec-1", "sources": [{"type": "file", "channels": [0], "source": "a.wav"}],
///                "sampling_rate": 24000, "num_samples": 84480, "duration": 3.52},
///  "features": {"num_frames": 330, "num_features": 100, "frame_shift": 0.0106,
///               "storage_type": "safetensors", "storage_path": "feats.safetensors",
///               "storage_key": "utt-0001"},
///  "type": "MonoCut"}
/// ```
/// Unknown fields are ignored so manifests written by other tools still load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cut {
    pub id: String,
    #[serde(default)]
    pub start: f64,
    pub duration: f64,
    #[serde(default)]
    pub channel: usize,
    #[serde(default)]
    pub supervisions: Vec<Supervision>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recording: Option<Recording>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<Features>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Supervision {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub recording_id: String,
    #[serde(default)]
    pub start: f64,
    #[serde(default)]
    pub duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "SupervisionCustom::is_empty")]
    pub custom: SupervisionCustom,
}

/// Free-form supervision attributes. Only `tokens` is interpreted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SupervisionCustom {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<Vec<String>>,
}

impl SupervisionCustom {
    fn is_empty(&self) -> bool {
        self.tokens.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    pub id: String,
    pub sources: Vec<AudioSource>,
    pub sampling_rate: u32,
    pub num_samples: u64,
    pub duration: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioSource {
    #[serde(rename = "type")]
    pub source_type: String,
    #[serde(default)]
    pub channels: Vec<usize>,
    pub source: String,
}

/// Where and how the precomputed acoustic features of a cut are stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Features {
    pub num_frames: usize,
    pub num_features: usize,
    #[serde(default)]
    pub frame_shift: f64,
    #[serde(default)]
    pub sampling_rate: u32,
    pub storage_type: String,
    pub storage_path: String,
    pub storage_key: String,
}

impl Cut {
    /// Creates a cut with no annotations, recording or features.
    pub fn new(id: impl Into<String>, start: f64, duration: f64) -> Self {
        Self {
            id: id.into(),
            start,
            duration,
            channel: 0,
            supervisions: Vec::new(),
            recording: None,
            features: None,
        }
    }

    pub fn with_supervision(mut self, supervision: Supervision) -> Self {
        self.supervisions.push(supervision);
        self
    }

    pub fn with_recording(mut self, recording: Recording) -> Self {
        self.recording = Some(recording);
        self
    }

    pub fn with_features(mut self, features: Features) -> Self {
        self.features = Some(features);
        self
    }

    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    /// Text of all supervisions joined with a space.
    pub fn text(&self) -> Result<String> {
        let parts: Vec<&str> = self
            .supervisions
            .iter()
            .filter_map(|s| s.text.as_deref())
            .collect();
        if parts.is_empty() {
            return Err(self.missing("text").into());
        }
        Ok(parts.join(" "))
    }

    /// Token sequence of the first supervision.
    pub fn tokens(&self) -> Result<&[String]> {
        self.supervisions
            .first()
            .and_then(|s| s.custom.tokens.as_deref())
            .ok_or_else(|| self.missing("tokens").into())
    }

    /// Speaker id of the first supervision.
    pub fn speaker(&self) -> Result<&str> {
        self.supervisions
            .first()
            .and_then(|s| s.speaker.as_deref())
            .ok_or_else(|| self.missing("speaker").into())
    }

    pub fn recording(&self) -> Result<&Recording> {
        self.recording
            .as_ref()
            .ok_or_else(|| self.missing("recording").into())
    }

    pub fn features(&self) -> Result<&Features> {
        self.features
            .as_ref()
            .ok_or_else(|| self.missing("features").into())
    }

    fn missing(&self, field: &'static str) -> DataModuleError {
        DataModuleError::MissingCutField {
            cut_id: self.id.clone(),
            field,
        }
    }
}

impl Supervision {
    pub fn new(id: impl Into<String>, text: impl Into<String>, speaker: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            recording_id: id.clone(),
            id,
            start: 0.0,
            duration: 0.0,
            text: Some(text.into()),
            speaker: Some(speaker.into()),
            language: None,
            custom: SupervisionCustom::default(),
        }
    }

    pub fn with_tokens<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.custom.tokens = Some(tokens.into_iter().map(Into::into).collect());
        self
    }
}

impl AudioSource {
    pub fn path(&self) -> Result<PathBuf> {
        if self.source_type != "file" {
            return Err(DataModuleError::UnsupportedAudioSource(self.source_type.clone()).into());
        }
        Ok(PathBuf::from(&self.source))
    }
}
