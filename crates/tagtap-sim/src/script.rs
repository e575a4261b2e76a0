//! Replay scripts.
//!
//! A script is a JSON array of steps. Each step either presents a mock tag to the
//! dispatcher, runs the legacy block write against a tag, or flips foreground dispatch
//! the way the application lifecycle would:
//!
//! ```json
//! [
//!   { "step": "discover", "action": "TECH_DISCOVERED",
//!     "tag": { "id": "04:a2:19:3c", "tech_list": ["NdefFormatable"] } },
//!   { "step": "foreground", "enabled": false },
//!   { "step": "legacy_write", "tag": { "id": "0a:0b", "tech_list": ["MifareClassic"] } }
//! ]
//! ```

use std::io::Write;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tagtap_core::{
    write_classic_block, ActionKind, Config, DiscoveryDispatcher, DiscoveryEvent, DisplayUpdate,
    LegacyWriteRequest, MockProbe, MockTag, SessionOutcome, TagtapError, TextPayload,
};
use thiserror::Error;
use tracing::{info, warn};

/// Errors raised while loading a script.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// The script file could not be read.
    #[error("Failed to read script {path}: {source}")]
    Read {
        /// Script path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The script is not valid JSON or has unknown steps.
    #[error("Failed to parse script {path}: {source}")]
    Parse {
        /// Script path.
        path: String,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// One scripted action.
#[derive(Debug, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    /// Deliver a discovery event. A missing `tag` simulates a malformed event.
    Discover {
        /// Platform action name.
        action: ActionKind,
        /// Tag in the field.
        #[serde(default)]
        tag: Option<MockTag>,
    },
    /// Run the legacy MIFARE Classic block write.
    LegacyWrite {
        /// Tag to write.
        tag: MockTag,
    },
    /// Enable or disable foreground dispatch.
    Foreground {
        /// New gate state.
        enabled: bool,
    },
}

/// Load a script from disk.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load(path: &Path) -> Result<Vec<Step>, ScriptError> {
    let content = std::fs::read_to_string(path).map_err(|source| ScriptError::Read {
        path: path.display().to_string(),
        source,
    })?;
    parse(&content).map_err(|source| ScriptError::Parse {
        path: path.display().to_string(),
        source,
    })
}

fn parse(content: &str) -> Result<Vec<Step>, serde_json::Error> {
    serde_json::from_str(content)
}

/// Output line for a legacy write.
#[derive(Debug, Serialize)]
struct LegacyWriteLine {
    kind: &'static str,
    tag_id: String,
    success: bool,
    error_code: Option<&'static str>,
    message: Option<String>,
}

/// Counters reported when a replay finishes.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Discovery events that produced a display update.
    pub displayed: usize,
    /// Discovery events dropped by the gate or action filter.
    pub ignored: usize,
    /// Sessions that formatted their tag.
    pub formatted: usize,
    /// Sessions that failed.
    pub failed: usize,
    /// Legacy writes that succeeded.
    pub legacy_written: usize,
}

/// Presentation-side state for a replay: the dispatcher and the last identifier shown.
pub struct Replay {
    dispatcher: DiscoveryDispatcher,
    legacy: LegacyWriteRequest,
    last_tag_id: Option<String>,
    summary: ReplaySummary,
}

impl Replay {
    /// Build a replay from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the legacy write settings are invalid.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let legacy = LegacyWriteRequest::from_config(&config.legacy)
            .map_err(TagtapError::from)
            .context("invalid legacy write settings")?;
        Ok(Self {
            dispatcher: DiscoveryDispatcher::from_config(config),
            legacy,
            last_tag_id: None,
            summary: ReplaySummary::default(),
        })
    }

    /// The identifier currently on display.
    pub fn last_tag_id(&self) -> Option<&str> {
        self.last_tag_id.as_deref()
    }

    /// Run every step, writing one JSON line per display update or legacy write.
    ///
    /// # Errors
    ///
    /// Returns an error only if writing output fails.
    pub fn run<W: Write>(
        &mut self,
        steps: Vec<Step>,
        out: &mut W,
    ) -> anyhow::Result<ReplaySummary> {
        for step in steps {
            self.apply(step, out)?;
        }
        Ok(self.summary.clone())
    }

    fn apply<W: Write>(&mut self, step: Step, out: &mut W) -> anyhow::Result<()> {
        match step {
            Step::Foreground { enabled: true } => self.dispatcher.enable_foreground_dispatch(),
            Step::Foreground { enabled: false } => self.dispatcher.disable_foreground_dispatch(),
            Step::Discover { action, tag } => {
                let probe = tag.as_ref().map(MockTag::probe);
                match self.dispatcher.on_tag_discovered(DiscoveryEvent::new(action, tag)) {
                    Some(update) => self.show(&update, probe.as_ref(), out)?,
                    None => self.summary.ignored += 1,
                }
            }
            Step::LegacyWrite { tag } => {
                let tag_id = tag.identifier().to_string();
                let line = match write_classic_block(&tag, &self.legacy) {
                    Ok(()) => {
                        self.summary.legacy_written += 1;
                        LegacyWriteLine {
                            kind: "legacy_write",
                            tag_id,
                            success: true,
                            error_code: None,
                            message: None,
                        }
                    }
                    Err(e) => {
                        let error = TagtapError::from(e);
                        warn!(code = error.error_code(), %error, "Legacy write failed");
                        LegacyWriteLine {
                            kind: "legacy_write",
                            tag_id,
                            success: false,
                            error_code: Some(error.error_code()),
                            message: Some(error.to_string()),
                        }
                    }
                };
                emit(out, &line)?;
            }
        }
        Ok(())
    }

    fn show<W: Write>(
        &mut self,
        update: &DisplayUpdate,
        probe: Option<&MockProbe>,
        out: &mut W,
    ) -> anyhow::Result<()> {
        self.summary.displayed += 1;
        match update.outcome() {
            Some(SessionOutcome::Formatted) => {
                self.summary.formatted += 1;
                if let Some(probe) = probe {
                    match read_back(probe) {
                        Ok(Some(payload)) => info!(
                            language = %payload.language,
                            text = %payload.text,
                            "Read back written record"
                        ),
                        Ok(None) => warn!("Formatted tag holds no NDEF message"),
                        Err(error) => warn!(
                            code = error.error_code(),
                            %error,
                            "Written record is unreadable"
                        ),
                    }
                }
            }
            Some(SessionOutcome::Failed(reason)) => {
                self.summary.failed += 1;
                let error = TagtapError::from(reason.clone());
                info!(
                    code = error.error_code(),
                    recoverable = error.is_recoverable(),
                    "Session failure hidden from notification"
                );
            }
            _ => {}
        }
        if let Some(tag_id) = update.tag_id() {
            self.last_tag_id = Some(tag_id.to_string());
        }

        emit(out, update)?;
        Ok(())
    }
}

/// Decode the first text record a tag holds, if it holds any NDEF message.
fn read_back(probe: &MockProbe) -> tagtap_core::Result<Option<TextPayload>> {
    let Some(message) = probe.ndef_message().transpose()? else {
        return Ok(None);
    };
    Ok(Some(message.first_text()?))
}

/// Write one value as a JSON line.
fn emit<W: Write, S: Serialize>(out: &mut W, value: &S) -> tagtap_core::Result<()> {
    serde_json::to_writer(&mut *out, value).map_err(std::io::Error::from)?;
    writeln!(out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = r#"[
        { "step": "discover", "action": "TECH_DISCOVERED",
          "tag": { "id": "04:a2:19:3c", "tech_list": ["NdefFormatable"] } },
        { "step": "discover", "action": "android.nfc.action.TAG_DISCOVERED",
          "tag": { "id": "ff", "tech_list": ["NdefFormatable"],
                   "behavior": { "fail_connect": true } } },
        { "step": "discover", "action": "NDEF_DISCOVERED" },
        { "step": "foreground", "enabled": false },
        { "step": "discover", "action": "TAG_DISCOVERED",
          "tag": { "id": "01", "tech_list": ["Ndef"] } },
        { "step": "foreground", "enabled": true },
        { "step": "legacy_write", "tag": { "id": "0a:0b", "tech_list": ["MifareClassic"] } },
        { "step": "legacy_write", "tag": { "id": "0c", "tech_list": ["Ndef"] } }
    ]"#;

    #[test]
    fn test_replay_script() {
        let steps = parse(SCRIPT).unwrap();
        assert_eq!(steps.len(), 8);

        let mut replay = Replay::new(&Config::default()).unwrap();
        let mut out = Vec::new();
        let summary = replay.run(steps, &mut out).unwrap();

        assert_eq!(
            summary,
            ReplaySummary {
                displayed: 3,
                ignored: 1,
                formatted: 1,
                failed: 1,
                legacy_written: 1,
            }
        );
        assert_eq!(replay.last_tag_id(), Some("ff"));

        let lines: Vec<serde_json::Value> = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0]["kind"], "scanned");
        assert_eq!(lines[0]["notification"], "the tag is 04:a2:19:3c");
        assert_eq!(lines[1]["outcome"]["status"], "failed");
        assert_eq!(lines[2]["kind"], "extraction_error");
        assert_eq!(lines[3]["success"], true);
        assert_eq!(lines[4]["error_code"], "CLASSIC_UNSUPPORTED");
    }

    #[test]
    fn test_bundled_demo_replays() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos/scan.json");
        let steps = load(&path).unwrap();

        let mut replay = Replay::new(&Config::default()).unwrap();
        let summary = replay.run(steps, &mut std::io::sink()).unwrap();
        assert_eq!(summary.displayed, 5);
        assert_eq!(summary.ignored, 1);
        assert_eq!(summary.formatted, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.legacy_written, 1);
    }

    #[test]
    fn test_read_back_decodes_formatted_record() {
        let tag = MockTag::new([0x04, 0xA2], ["NdefFormatable"]);
        let probe = tag.probe();
        assert!(read_back(&probe).unwrap().is_none());

        let mut replay = Replay::new(&Config::default()).unwrap();
        let steps = vec![Step::Discover {
            action: ActionKind::TechDiscovered,
            tag: Some(tag),
        }];
        replay.run(steps, &mut std::io::sink()).unwrap();

        let payload = read_back(&probe).unwrap().unwrap();
        assert_eq!(payload.language, "en");
        assert_eq!(payload.text, "test");
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_output_failure_is_an_io_error() {
        let err = emit(&mut BrokenPipe, &serde_json::json!({ "displayed": 1 })).unwrap_err();
        assert_eq!(err.error_code(), "IO_ERROR");

        let mut replay = Replay::new(&Config::default()).unwrap();
        let steps = vec![Step::Discover {
            action: ActionKind::TagDiscovered,
            tag: None,
        }];
        assert!(replay.run(steps, &mut BrokenPipe).is_err());
    }

    #[test]
    fn test_unknown_step_is_rejected() {
        assert!(parse(r#"[{ "step": "explode" }]"#).is_err());
    }

    #[test]
    fn test_load_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("script.json");
        std::fs::write(&path, "not json").unwrap();

        let err = load(&path).unwrap_err();
        assert!(matches!(err, ScriptError::Parse { .. }));
        assert!(err.to_string().contains("script.json"));
    }

    #[test]
    fn test_invalid_legacy_config_is_rejected() {
        let mut config = Config::default();
        config.legacy.key = "zz".to_string();
        assert!(Replay::new(&config).is_err());
    }
}
