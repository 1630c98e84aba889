//! `danmu plugins`: list registered plugins and their config fields.

use {anyhow::Result, danmu_plugins::PluginDescriptor};

use crate::registry::build_registry;

pub fn handle_plugins(json: bool) -> Result<()> {
    let registry = build_registry(None)?;
    let descriptors = registry.descriptors();

    if json {
        let list: Vec<&PluginDescriptor> = descriptors.iter().map(|d| &**d).collect();
        println!("{}", serde_json::to_string_pretty(&list)?);
        return Ok(());
    }

    for descriptor in &descriptors {
        print!("{}", describe(descriptor));
    }
    Ok(())
}

fn describe(descriptor: &PluginDescriptor) -> String {
    let mut out = format!("{} ({})\n", descriptor.name, descriptor.capability);
    if !descriptor.description.is_empty() {
        out.push_str(&format!("  {}\n", descriptor.description));
    }
    for field in &descriptor.fields {
        out.push_str(&format!(
            "    {:<12} default {}  {}\n",
            field.name,
            field.default.to_json(),
            field.description
        ));
        if !field.options.is_empty() {
            out.push_str(&format!("    {:<12} one of: {}\n", "", field.options.join(", ")));
        }
    }
    out
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        danmu_plugins::{Capability, ConfigField},
    };

    #[test]
    fn describe_lists_fields_and_options() {
        let descriptor = PluginDescriptor::new("tts", Capability::Consumer)
            .with_description("Reads events aloud")
            .field(ConfigField::choice(
                "backend",
                &["edge-tts", "piper"],
                "edge-tts",
                "Speech engine",
            ));
        let text = describe(&descriptor);
        assert!(text.starts_with("tts (consumer)\n"));
        assert!(text.contains("Reads events aloud"));
        assert!(text.contains("\"edge-tts\""));
        assert!(text.contains("one of: edge-tts, piper"));
    }
}
