//! Detector backed by a long-lived helper process.
//!
//! The helper owns the neural model; we speak newline-delimited JSON over its
//! stdio. Scoring requests are a JSON header line followed by the raw samples
//! as little-endian i16:
//!
//! ```text
//! -> {"id":7,"op":"score_clip","samples":80000}\n<160000 bytes>
//! <- {"ok":true,"id":7,"scores":[{"hey_jarvis":0.02},{"hey_jarvis":0.91}]}
//! ```
//!
//! Replies carrying an id that is not the one being waited for are late
//! answers to a request that already timed out and are skipped.

use super::{DetectionResult, ModelRef, WakeModel};
use crate::audio::{samples_to_duration, AudioChunk, Clip};
use crate::error::DetectorError;
use crate::log_debug;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// Program plus leading arguments used to launch the helper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectorCommand {
    pub program: String,
    pub args: Vec<String>,
    /// Longest we wait for any single reply.
    pub response_timeout: Duration,
}

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Request {
    Hello,
    Reset,
    ScoreChunk { samples: usize },
    ScoreClip { samples: usize },
}

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    id: u64,
    #[serde(flatten)]
    request: &'a Request,
}

#[derive(Debug, Deserialize)]
struct Response {
    ok: bool,
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    scores: Vec<BTreeMap<String, f32>>,
}

pub struct CommandDetector {
    command_line: String,
    child: Child,
    stdin: ChildStdin,
    replies: Receiver<std::io::Result<String>>,
    response_timeout: Duration,
    next_id: u64,
    labels: Vec<String>,
}

impl CommandDetector {
    /// Launch the helper and wait for its hello with the loaded labels.
    pub fn spawn(command: &DetectorCommand, model: &ModelRef) -> Result<Self, DetectorError> {
        let mut args = command.args.clone();
        args.extend(model.helper_args());
        let command_line = format!("{} {}", command.program, args.join(" "));

        let mut child = Command::new(&command.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| DetectorError::Launch {
                command: command_line.clone(),
                source,
            })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| DetectorError::Protocol("helper stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DetectorError::Protocol("helper stdout unavailable".into()))?;

        // Replies are read on a side thread so a wedged helper turns into a
        // timeout instead of a hung scheduler.
        let (reply_tx, replies) = bounded(4);
        thread::Builder::new()
            .name("wakeplay-detector-io".to_string())
            .spawn(move || {
                for line in BufReader::new(stdout).lines() {
                    if reply_tx.send(line).is_err() {
                        break;
                    }
                }
            })
            .map_err(DetectorError::Io)?;

        let mut detector = Self {
            command_line,
            child,
            stdin,
            replies,
            response_timeout: command.response_timeout,
            next_id: 0,
            labels: Vec::new(),
        };
        let hello = detector.request(&Request::Hello, None)?;
        detector.labels = hello.labels;
        log_debug(&format!(
            "detector helper ready: `{}` labels={:?}",
            detector.command_line, detector.labels
        ));
        Ok(detector)
    }

    fn request(
        &mut self,
        request: &Request,
        samples: Option<&[i16]>,
    ) -> Result<Response, DetectorError> {
        self.next_id += 1;
        let id = self.next_id;
        let mut header = serde_json::to_vec(&Envelope { id, request })
            .map_err(|err| DetectorError::Protocol(format!("encode request: {err}")))?;
        header.push(b'\n');
        self.stdin.write_all(&header)?;
        if let Some(samples) = samples {
            let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
            self.stdin.write_all(&bytes)?;
        }
        self.stdin.flush()?;

        let deadline = Instant::now() + self.response_timeout;
        loop {
            let wait = deadline.saturating_duration_since(Instant::now());
            let line = match self.replies.recv_timeout(wait) {
                Ok(line) => line?,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(DetectorError::Protocol(format!(
                        "no reply within {} ms",
                        self.response_timeout.as_millis()
                    )))
                }
                Err(RecvTimeoutError::Disconnected) => return Err(DetectorError::Exited),
            };
            let response: Response = serde_json::from_str(line.trim()).map_err(|err| {
                DetectorError::Protocol(format!("bad reply `{}`: {err}", line.trim()))
            })?;
            if let Some(stale) = response.id.filter(|&reply_id| reply_id != id) {
                log_debug(&format!(
                    "skipping stale detector reply {stale} (waiting for {id})"
                ));
                continue;
            }
            if !response.ok {
                return Err(DetectorError::Rejected(
                    response.error.unwrap_or_else(|| "unspecified error".to_string()),
                ));
            }
            return Ok(response);
        }
    }
}

impl WakeModel for CommandDetector {
    fn reset(&mut self) -> Result<(), DetectorError> {
        self.request(&Request::Reset, None).map(|_| ())
    }

    fn score_chunk(&mut self, chunk: &AudioChunk) -> Result<DetectionResult, DetectorError> {
        let response = self.request(
            &Request::ScoreChunk {
                samples: chunk.len(),
            },
            Some(chunk.samples()),
        )?;
        let window_end = samples_to_duration((chunk.seq() as usize + 1) * chunk.len());
        let scores = response.scores.into_iter().next_back().unwrap_or_default();
        Ok(DetectionResult::new(scores, window_end))
    }

    fn score_clip(&mut self, clip: &Clip) -> Result<Vec<DetectionResult>, DetectorError> {
        let response = self.request(
            &Request::ScoreClip {
                samples: clip.samples.len(),
            },
            Some(&clip.samples),
        )?;
        Ok(response
            .scores
            .into_iter()
            .map(|scores| DetectionResult::new(scores, clip.window_end))
            .collect())
    }

    fn labels(&self) -> Vec<String> {
        self.labels.clone()
    }
}

impl Drop for CommandDetector {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn shell_helper(script: &str, timeout_ms: u64) -> DetectorCommand {
        DetectorCommand {
            program: "sh".into(),
            args: vec!["-c".into(), script.into(), "helper".into()],
            response_timeout: Duration::from_millis(timeout_ms),
        }
    }

    fn named() -> ModelRef {
        ModelRef::Named(vec!["wake".into()])
    }

    #[test]
    fn hello_reports_labels_and_rejections_surface() {
        let command = shell_helper(
            r#"read l; echo '{"ok":true,"labels":["wake","alexa"]}'; read l; echo '{"ok":false,"error":"nope"}'; sleep 2"#,
            2_000,
        );
        let mut detector = CommandDetector::spawn(&command, &named()).unwrap();
        assert_eq!(detector.labels(), vec!["wake", "alexa"]);
        match detector.reset() {
            Err(DetectorError::Rejected(message)) => assert_eq!(message, "nope"),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn malformed_reply_is_protocol_error() {
        let command = shell_helper("read l; echo 'not json'; sleep 2", 2_000);
        assert!(matches!(
            CommandDetector::spawn(&command, &named()),
            Err(DetectorError::Protocol(_))
        ));
    }

    #[test]
    fn silent_helper_times_out() {
        let command = shell_helper("sleep 5", 100);
        match CommandDetector::spawn(&command, &named()) {
            Err(DetectorError::Protocol(message)) => assert!(message.contains("no reply")),
            Err(other) => panic!("expected timeout, got {other}"),
            Ok(_) => panic!("expected timeout"),
        }
    }

    #[test]
    fn exited_helper_is_an_error() {
        let command = shell_helper("exit 0", 2_000);
        assert!(CommandDetector::spawn(&command, &named()).is_err());
    }

    #[test]
    fn missing_program_is_launch_error() {
        let command = DetectorCommand {
            program: "/nonexistent/wakeplay-helper".into(),
            args: Vec::new(),
            response_timeout: Duration::from_secs(1),
        };
        assert!(matches!(
            CommandDetector::spawn(&command, &named()),
            Err(DetectorError::Launch { .. })
        ));
    }

    fn python_available() -> bool {
        Command::new("python3")
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    #[test]
    fn stub_helper_scores_clip_frames() {
        if !python_available() {
            return;
        }
        let script = Path::new(env!("CARGO_MANIFEST_DIR")).join("scripts/wake_detector.py");
        let command = DetectorCommand {
            program: "python3".into(),
            args: vec![
                script.to_string_lossy().into_owned(),
                "--stub".into(),
                "wake".into(),
            ],
            response_timeout: Duration::from_secs(5),
        };
        let mut detector = CommandDetector::spawn(&command, &named()).unwrap();
        assert_eq!(detector.labels(), vec!["wake"]);

        let mut samples = vec![0i16; 1280];
        samples.extend(std::iter::repeat(4_000i16).take(1280));
        let clip = Clip {
            samples,
            first_seq: 0,
            last_seq: 1,
            window_end: Duration::from_millis(160),
        };
        detector.reset().unwrap();
        let results = detector.score_clip(&clip).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].scores["wake"], 0.0);
        assert!(results[1].scores["wake"] > 0.5);
        assert_eq!(results[1].window_end, Duration::from_millis(160));

        let chunk = AudioChunk::new(3, vec![4_000; 1280], 1280).unwrap();
        let result = detector.score_chunk(&chunk).unwrap();
        assert_eq!(result.window_end, Duration::from_millis(320));
        assert!(result.scores["wake"] > 0.5);
    }

    #[test]
    fn late_reply_after_timeout_does_not_shift_later_replies() {
        if !python_available() {
            return;
        }
        // Answers the first reset only after the caller has given up on it.
        let helper = r#"
import json, sys, time
stdin = sys.stdin.buffer
slow_reset = True
while True:
    line = stdin.readline()
    if not line:
        break
    request = json.loads(line)
    count = int(request.get("samples", 0))
    if count:
        stdin.read(count * 2)
    reply = {"ok": True, "id": request["id"]}
    if request["op"] == "hello":
        reply["labels"] = ["wake"]
    elif request["op"] == "reset" and slow_reset:
        slow_reset = False
        time.sleep(1.0)
    elif request["op"].startswith("score"):
        reply["scores"] = [{"wake": 0.9}]
    sys.stdout.write(json.dumps(reply) + "\n")
    sys.stdout.flush()
"#;
        let command = DetectorCommand {
            program: "python3".into(),
            args: vec!["-c".into(), helper.into()],
            response_timeout: Duration::from_millis(800),
        };
        let mut detector = CommandDetector::spawn(&command, &named()).unwrap();
        match detector.reset() {
            Err(DetectorError::Protocol(message)) => assert!(message.contains("no reply")),
            other => panic!("expected timeout, got {other:?}"),
        }

        detector.reset().unwrap();
        let clip = Clip {
            samples: vec![0; 1280],
            first_seq: 0,
            last_seq: 0,
            window_end: Duration::from_millis(80),
        };
        let results = detector.score_clip(&clip).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].scores["wake"], 0.9);
    }
}
