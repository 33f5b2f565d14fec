//! Result sinks shipped with the crate.

use crate::analyzer::FaceResult;
use crate::dispatcher::ResultSink;
use crate::{Error, Result};
use async_trait::async_trait;
use log::info;
use serde::Serialize;
use std::io::Write;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// One delivered result set as written by [`JsonLinesSink`]
#[derive(Debug, Serialize)]
struct DeliveryRecord<'a> {
    sent_at_ms: u128,
    face_count: usize,
    faces: &'a [FaceResult],
}

/// Writes every result set as one JSON document per line
pub struct JsonLinesSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    /// Create a sink writing to `writer`
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Recover the writer
    ///
    /// # Errors
    ///
    /// Returns `Dispatch` if a writer panicked while holding the lock
    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|_| Error::Dispatch("JSON sink writer poisoned".to_string()))
    }
}

#[async_trait]
impl<W: Write + Send> ResultSink for JsonLinesSink<W> {
    async fn send(&self, results: &[FaceResult]) -> Result<()> {
        let sent_at_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis())
            .unwrap_or_default();
        let line = serde_json::to_string(&DeliveryRecord {
            sent_at_ms,
            face_count: results.len(),
            faces: results,
        })?;

        let mut writer = self
            .writer
            .lock()
            .map_err(|_| Error::Dispatch("JSON sink writer poisoned".to_string()))?;
        writeln!(writer, "{line}")?;
        writer.flush()?;
        Ok(())
    }

    fn name(&self) -> &str {
        "json-lines"
    }
}

/// Logs a one-line summary of every result set
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl ResultSink for LogSink {
    async fn send(&self, results: &[FaceResult]) -> Result<()> {
        let summary: Vec<String> = results
            .iter()
            .map(|face| match (&face.attributes, &face.emotion) {
                (Some(attributes), Some(emotion)) => format!(
                    "{} ({:.0}y {}, {})",
                    face.face_id,
                    attributes.age,
                    attributes.gender,
                    emotion.dominant().0
                ),
                (Some(attributes), None) => {
                    format!("{} ({:.0}y {})", face.face_id, attributes.age, attributes.gender)
                }
                (None, Some(emotion)) => format!("{} ({})", face.face_id, emotion.dominant().0),
                (None, None) => face.face_id.clone(),
            })
            .collect();
        info!("Analysed {} face(s): [{}]", results.len(), summary.join(", "));
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Discards every result set
#[derive(Debug, Default)]
pub struct NullSink;

#[async_trait]
impl ResultSink for NullSink {
    async fn send(&self, _results: &[FaceResult]) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "none"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{EmotionScores, FaceAttributes};
    use crate::geometry::DetectionBox;

    #[tokio::test]
    async fn test_json_lines_one_line_per_send() {
        let sink = JsonLinesSink::new(Vec::new());
        let face = FaceResult {
            face_id: "face-0".to_string(),
            face_rect: DetectionBox::new(1, 2, 3, 4),
            attributes: Some(FaceAttributes {
                age: 31.0,
                gender: "female".to_string(),
                ..FaceAttributes::default()
            }),
            emotion: Some(EmotionScores {
                happiness: 0.9,
                ..EmotionScores::default()
            }),
            thumbnail: None,
        };
        sink.send(&[face]).await.unwrap();
        sink.send(&[]).await.unwrap();

        let output = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["face_count"], 1);
        assert_eq!(first["faces"][0]["face_id"], "face-0");
        assert_eq!(first["faces"][0]["face_rect"]["width"], 3);
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["face_count"], 0);
    }

    #[tokio::test]
    async fn test_log_sink_accepts_partial_results() {
        let partial = FaceResult {
            face_id: "face-1".to_string(),
            ..FaceResult::default()
        };
        assert!(LogSink.send(&[partial]).await.is_ok());
    }
}
