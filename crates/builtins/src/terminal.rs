//! Renders formatted envelopes as coloured terminal lines.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use {
    anyhow::{Result, bail},
    async_trait::async_trait,
    crossterm::style::{Color, Stylize},
    danmu_common::{Envelope, FormattedEnvelope},
    danmu_plugins::{Capability, ConfigField, Consumer, Plugin, PluginConfig, PluginDescriptor, PluginRegistry},
    tokio::sync::mpsc,
    tokio_util::sync::CancellationToken,
};

pub const NAME: &str = "terminal";

/// Receives rendered lines; owned by whatever draws the terminal.
pub type TerminalSink = mpsc::UnboundedSender<String>;

const TIME_COLOR: Color = Color::Rgb {
    r: 0x88,
    g: 0x88,
    b: 0x88,
};

fn platform_color(platform: &str) -> Color {
    let (r, g, b) = match platform {
        "bilibili" => (0x00, 0xa1, 0xd6),
        "douyin" => (0xfe, 0x2c, 0x55),
        "kuaishou" => (0xff, 0x66, 0x00),
        "douyu" => (0xff, 0x75, 0x00),
        "huya" => (0xff, 0x66, 0x00),
        _ => (0x66, 0x66, 0x66),
    };
    Color::Rgb { r, g, b }
}

/// `[HH:MM:SS] {platform} | {user}: {content}`, platform tag on its brand
/// colour.
pub fn render_line(formatted: &FormattedEnvelope, show_time: bool) -> String {
    let tag = format!(" {} ", formatted.platform)
        .with(Color::White)
        .on(platform_color(&formatted.platform))
        .bold();
    let line = format!("{tag} | {}: {}", formatted.user_name, formatted.content);
    if show_time {
        let time = format!("[{}]", formatted.timestamp.format("%H:%M:%S")).with(TIME_COLOR);
        format!("{time} {line}")
    } else {
        line
    }
}

pub struct TerminalConsumer {
    sink: Option<TerminalSink>,
    show_time: AtomicBool,
    cancel: CancellationToken,
}

impl TerminalConsumer {
    pub fn new(sink: Option<TerminalSink>) -> Self {
        Self {
            sink,
            show_time: AtomicBool::new(true),
            cancel: CancellationToken::new(),
        }
    }
}

#[async_trait]
impl Plugin for TerminalConsumer {
    fn name(&self) -> &str {
        NAME
    }

    fn capability(&self) -> Capability {
        Capability::Consumer
    }

    async fn init(&self, config: PluginConfig) -> Result<()> {
        self.show_time
            .store(config.bool("show_time")?, Ordering::Relaxed);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.cancel.cancel();
        Ok(())
    }

    fn as_consumer(self: Arc<Self>) -> Option<Arc<dyn Consumer>> {
        Some(self)
    }
}

#[async_trait]
impl Consumer for TerminalConsumer {
    async fn consume(&self, envelope: Arc<Envelope>) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Ok(());
        }
        let (Some(sink), Some(formatted)) = (&self.sink, &envelope.formatted) else {
            return Ok(());
        };
        let line = render_line(formatted, self.show_time.load(Ordering::Relaxed));
        if sink.send(line).is_err() {
            bail!("terminal view is gone");
        }
        Ok(())
    }
}

pub fn descriptor() -> PluginDescriptor {
    PluginDescriptor::new(NAME, Capability::Consumer)
        .with_description("Scrolling event log in the terminal")
        .field(ConfigField::bool("show_time", true, "Prefix each line with the time"))
}

pub(crate) fn register(registry: &PluginRegistry, sink: Option<TerminalSink>) -> danmu_plugins::Result<()> {
    registry.register(descriptor(), move || Arc::new(TerminalConsumer::new(sink.clone())))
}
