// src/capture/namer.rs
//
// Two captures of one source within the same second get the same name and
// the later one overwrites the earlier, locally and on the relay.

use std::path::PathBuf;

use chrono::{Datelike, NaiveDateTime};

use crate::registry::SourceId;

pub const FRAME_EXTENSION: &str = "jpeg";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactName {
    /// `[YYYY, MM, DD]`
    pub remote_segments: Vec<String>,
    /// `{source_id}_{HHMMSS}.jpeg`
    pub filename: String,
}

impl ArtifactName {
    /// Path relative to the capture root.
    pub fn local_path(&self) -> PathBuf {
        let mut path: PathBuf = self.remote_segments.iter().collect();
        path.push(&self.filename);
        path
    }

    pub fn remote_path(&self) -> String {
        format!("{}/{}", self.remote_segments.join("/"), self.filename)
    }
}

pub fn name(source_id: SourceId, at: &NaiveDateTime) -> ArtifactName {
    ArtifactName {
        remote_segments: vec![
            format!("{:04}", at.year()),
            format!("{:02}", at.month()),
            format!("{:02}", at.day()),
        ],
        filename: format!(
            "{}_{}.{}",
            source_id,
            at.format("%H%M%S"),
            FRAME_EXTENSION
        ),
    }
}
