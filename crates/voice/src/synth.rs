//! Text-to-speech backends.
//!
//! Both backends are local command-line tools that write an audio file:
//! `edge-tts` (install: `pip install edge-tts`) and `piper`
//! (install: `pip install piper-tts`).

use std::{fmt, process::Stdio, str::FromStr};

use {
    anyhow::{Context, Result, anyhow, bail},
    async_trait::async_trait,
    bytes::Bytes,
    tokio::{io::AsyncWriteExt, process::Command},
    tracing::debug,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Mp3,
    Wav,
}

impl AudioFormat {
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
        }
    }
}

/// One synthesized utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub data: Bytes,
    pub format: AudioFormat,
}

#[async_trait]
pub trait Synthesizer: Send + Sync {
    fn id(&self) -> &'static str;

    /// Convert text to audio. Safe to call concurrently.
    async fn synthesize(&self, text: &str) -> Result<AudioClip>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    EdgeTts,
    Piper,
}

impl Backend {
    pub const NAMES: &'static [&'static str] = &["edge-tts", "piper"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EdgeTts => "edge-tts",
            Self::Piper => "piper",
        }
    }

    fn binary(&self) -> &'static str {
        match self {
            Self::EdgeTts => "edge-tts",
            Self::Piper => "piper",
        }
    }

    fn format(&self) -> AudioFormat {
        match self {
            Self::EdgeTts => AudioFormat::Mp3,
            Self::Piper => AudioFormat::Wav,
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "edge-tts" => Ok(Self::EdgeTts),
            "piper" => Ok(Self::Piper),
            other => Err(anyhow!("unknown speech backend: {other}")),
        }
    }
}

/// Runs a synthesis CLI per utterance, collecting its output file.
///
/// `voice` is an edge-tts voice name (`zh-CN-XiaoxiaoNeural`) or a path to
/// a piper `.onnx` model.
pub struct CommandSynthesizer {
    backend: Backend,
    voice: String,
    binary: String,
}

impl CommandSynthesizer {
    pub fn new(backend: Backend, voice: impl Into<String>) -> Self {
        Self {
            backend,
            voice: voice.into(),
            binary: backend.binary().to_string(),
        }
    }

    /// Override the executable, e.g. a virtualenv path.
    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Fail fast when the executable is not on `PATH`.
    pub fn check(&self) -> Result<()> {
        which::which(&self.binary)
            .map(|_| ())
            .with_context(|| format!("{} not found on PATH", self.binary))
    }

    fn command(&self, output: &std::path::Path) -> Command {
        let mut cmd = Command::new(&self.binary);
        match self.backend {
            Backend::EdgeTts => {
                cmd.arg("--voice")
                    .arg(&self.voice)
                    .arg("--write-media")
                    .arg(output);
            },
            Backend::Piper => {
                cmd.arg("--model")
                    .arg(&self.voice)
                    .arg("--output_file")
                    .arg(output);
            },
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Synthesizer for CommandSynthesizer {
    fn id(&self) -> &'static str {
        self.backend.as_str()
    }

    async fn synthesize(&self, text: &str) -> Result<AudioClip> {
        let format = self.backend.format();
        let output = tempfile::Builder::new()
            .prefix("danmu-tts-")
            .suffix(&format!(".{}", format.extension()))
            .tempfile()?;

        let mut cmd = self.command(output.path());
        if self.backend == Backend::EdgeTts {
            cmd.arg("--text").arg(text);
        }
        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.binary))?;
        if let Some(mut stdin) = child.stdin.take() {
            if self.backend == Backend::Piper {
                stdin.write_all(text.as_bytes()).await?;
            }
            stdin.shutdown().await?;
        }

        let result = child.wait_with_output().await?;
        if !result.status.success() {
            bail!(
                "{} failed: {}",
                self.binary,
                String::from_utf8_lossy(&result.stderr).trim()
            );
        }

        let data = tokio::fs::read(output.path()).await?;
        if data.is_empty() {
            bail!("{} produced no audio", self.binary);
        }
        debug!(backend = %self.backend, bytes = data.len(), "synthesized speech");
        Ok(AudioClip {
            data: Bytes::from(data),
            format,
        })
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_names_round_trip() {
        for name in Backend::NAMES {
            assert_eq!(name.parse::<Backend>().unwrap().as_str(), *name);
        }
        assert!("espeak".parse::<Backend>().is_err());
    }

    #[test]
    fn formats_follow_backend() {
        assert_eq!(Backend::EdgeTts.format().extension(), "mp3");
        assert_eq!(Backend::Piper.format().extension(), "wav");
    }

    #[test]
    fn missing_binary_fails_check() {
        let synth = CommandSynthesizer::new(Backend::Piper, "model.onnx")
            .with_binary("__danmu_no_such_binary__");
        assert!(synth.check().is_err());
    }

    #[tokio::test]
    async fn failed_spawn_is_an_error() {
        let synth = CommandSynthesizer::new(Backend::EdgeTts, "zh-CN-XiaoxiaoNeural")
            .with_binary("__danmu_no_such_binary__");
        assert!(synth.synthesize("hello").await.is_err());
    }
}
