//! Audio playback through an external player process.

use std::{fmt, path::PathBuf, process::Stdio, str::FromStr};

use {
    anyhow::{Context, Result, anyhow, bail},
    async_trait::async_trait,
    tokio::{io::AsyncWriteExt, process::Command},
    tracing::debug,
};

use crate::synth::AudioClip;

#[async_trait]
pub trait Player: Send + Sync {
    /// Play a clip to completion. Dropping the future stops playback.
    async fn play(&self, clip: &AudioClip) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerKind {
    Auto,
    Mpv,
    Ffplay,
    Afplay,
}

impl PlayerKind {
    pub const NAMES: &'static [&'static str] = &["auto", "mpv", "ffplay", "afplay"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Mpv => "mpv",
            Self::Ffplay => "ffplay",
            Self::Afplay => "afplay",
        }
    }

    /// Candidates tried by `auto`, in order.
    fn auto_order() -> &'static [PlayerKind] {
        if cfg!(target_os = "macos") {
            &[Self::Afplay, Self::Mpv, Self::Ffplay]
        } else {
            &[Self::Mpv, Self::Ffplay]
        }
    }
}

impl fmt::Display for PlayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlayerKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auto" => Ok(Self::Auto),
            "mpv" => Ok(Self::Mpv),
            "ffplay" => Ok(Self::Ffplay),
            "afplay" => Ok(Self::Afplay),
            other => Err(anyhow!("unknown audio player: {other}")),
        }
    }
}

/// A resolved player executable.
#[derive(Debug, Clone)]
pub struct CommandPlayer {
    kind: PlayerKind,
    program: PathBuf,
}

impl CommandPlayer {
    /// Locate the requested player on `PATH`; `auto` picks the first
    /// available candidate for this OS.
    pub fn detect(kind: PlayerKind) -> Result<Self> {
        let explicit = [kind];
        let candidates: &[PlayerKind] = if kind == PlayerKind::Auto {
            PlayerKind::auto_order()
        } else {
            &explicit
        };
        for candidate in candidates {
            if let Ok(program) = which::which(candidate.as_str()) {
                debug!(player = %candidate, path = %program.display(), "audio player found");
                return Ok(Self {
                    kind: *candidate,
                    program,
                });
            }
        }
        let names: Vec<&str> = candidates.iter().map(|c| c.as_str()).collect();
        bail!("no audio player found (tried {})", names.join(", "))
    }

    pub fn kind(&self) -> PlayerKind {
        self.kind
    }

    fn reads_stdin(&self) -> bool {
        !matches!(self.kind, PlayerKind::Afplay)
    }

    fn base_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        match self.kind {
            PlayerKind::Mpv => {
                cmd.args(["--really-quiet", "--no-terminal", "--no-video"]);
            },
            PlayerKind::Ffplay => {
                cmd.args(["-nodisp", "-autoexit", "-loglevel", "quiet"]);
            },
            PlayerKind::Afplay | PlayerKind::Auto => {},
        }
        cmd.stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Player for CommandPlayer {
    async fn play(&self, clip: &AudioClip) -> Result<()> {
        let output = if self.reads_stdin() {
            let mut child = self
                .base_command()
                .arg("-")
                .stdin(Stdio::piped())
                .spawn()
                .with_context(|| format!("failed to start {}", self.kind))?;
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(&clip.data).await?;
                stdin.shutdown().await?;
            }
            child.wait_with_output().await?
        } else {
            // afplay cannot read from stdin.
            let file = tempfile::Builder::new()
                .prefix("danmu-play-")
                .suffix(&format!(".{}", clip.format.extension()))
                .tempfile()?;
            tokio::fs::write(file.path(), &clip.data).await?;
            self.base_command()
                .arg(file.path())
                .stdin(Stdio::null())
                .output()
                .await
                .with_context(|| format!("failed to start {}", self.kind))?
        };

        if !output.status.success() {
            bail!(
                "{} exited with {}: {}",
                self.kind,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}
