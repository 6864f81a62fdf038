//! Sensor config rendering and process launch.

use std::path::Path;
use std::process::Stdio;

use tokio::process::{Child, ChildStdout, Command};
use tracing::{info, warn};

use netspan_core::config::{
    COMMAND_CONFIG_PLACEHOLDER, COMMAND_INTERFACE_PLACEHOLDER, INTERFACE_TEMPLATE_VAR,
    SensorSettings,
};

use crate::error::SpanPipelineError;

/// Copies `template` to `output`, replacing every `${NETWORK_INTERFACE}`.
pub async fn render_sensor_config(
    template: &Path,
    output: &Path,
    interface: &str,
) -> Result<(), SpanPipelineError> {
    let content = tokio::fs::read_to_string(template)
        .await
        .map_err(|e| SpanPipelineError::SensorConfig {
            path: template.display().to_string(),
            reason: e.to_string(),
        })?;

    if !content.contains(INTERFACE_TEMPLATE_VAR) {
        warn!(
            template = %template.display(),
            "sensor config template has no {} placeholder",
            INTERFACE_TEMPLATE_VAR
        );
    }

    let rendered = content.replace(INTERFACE_TEMPLATE_VAR, interface);
    tokio::fs::write(output, rendered)
        .await
        .map_err(|e| SpanPipelineError::SensorConfig {
            path: output.display().to_string(),
            reason: e.to_string(),
        })?;
    Ok(())
}

/// Substitutes `{config}` and `{interface}` in the configured argv.
pub fn sensor_argv(settings: &SensorSettings, interface: &str) -> Vec<String> {
    let config_path = settings.sensor_config_path.display().to_string();
    settings
        .sensor_command
        .iter()
        .map(|arg| {
            arg.replace(COMMAND_CONFIG_PLACEHOLDER, &config_path)
                .replace(COMMAND_INTERFACE_PLACEHOLDER, interface)
        })
        .collect()
}

/// A running sensor with its stdout captured.
#[derive(Debug)]
pub struct SensorProcess {
    pub child: Child,
    pub stdout: ChildStdout,
}

/// Renders the config and starts the sensor.
pub async fn launch_sensor(
    settings: &SensorSettings,
    interface: &str,
) -> Result<SensorProcess, SpanPipelineError> {
    render_sensor_config(
        &settings.sensor_config_template,
        &settings.sensor_config_path,
        interface,
    )
    .await?;

    let argv = sensor_argv(settings, interface);
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| SpanPipelineError::SensorLaunch("empty sensor command".to_owned()))?;

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| SpanPipelineError::SensorLaunch(format!("{program}: {e}")))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| SpanPipelineError::SensorLaunch("sensor stdout not captured".to_owned()))?;

    info!(
        pid = child.id(),
        command = %argv.join(" "),
        interface,
        "sensor started"
    );
    Ok(SensorProcess { child, stdout })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn settings(dir: &Path, command: &[&str]) -> SensorSettings {
        SensorSettings {
            sensor_config_template: dir.join("suricata.yaml.tmpl"),
            sensor_config_path: dir.join("suricata.yaml"),
            sensor_command: command.iter().map(|s| (*s).to_owned()).collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn template_is_rendered() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("t.yaml");
        let output = dir.path().join("o.yaml");
        std::fs::write(
            &template,
            "af-packet:\n  - interface: ${NETWORK_INTERFACE}\npcap:\n  - interface: ${NETWORK_INTERFACE}\n",
        )
        .unwrap();

        render_sensor_config(&template, &output, "ens5").await.unwrap();

        let rendered = std::fs::read_to_string(&output).unwrap();
        assert_eq!(
            rendered,
            "af-packet:\n  - interface: ens5\npcap:\n  - interface: ens5\n"
        );
    }

    #[tokio::test]
    async fn missing_template_is_sensor_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = render_sensor_config(
            &dir.path().join("absent.yaml"),
            &dir.path().join("out.yaml"),
            "eth0",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SpanPipelineError::SensorConfig { .. }));
    }

    #[test]
    fn argv_placeholders_substituted() {
        let settings = SensorSettings::default();
        let argv = sensor_argv(&settings, "eth0");
        assert_eq!(
            argv,
            vec![
                "stdbuf",
                "-oL",
                "suricata",
                "-c",
                "/tmp/netspan-suricata.yaml",
                "-i",
                "eth0"
            ]
        );
    }

    #[tokio::test]
    async fn launch_captures_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path(), &["cat", "{config}"]);
        std::fs::write(&settings.sensor_config_template, "iface: ${NETWORK_INTERFACE}\n").unwrap();

        let mut sensor = launch_sensor(&settings, "eth7").await.unwrap();
        let mut out = String::new();
        sensor.stdout.read_to_string(&mut out).await.unwrap();
        sensor.child.wait().await.unwrap();

        assert_eq!(out, "iface: eth7\n");
    }

    #[tokio::test]
    async fn unknown_program_is_launch_error() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path(), &["/nonexistent/netspan-sensor"]);
        std::fs::write(&settings.sensor_config_template, "").unwrap();

        let err = launch_sensor(&settings, "eth0").await.unwrap_err();
        assert!(matches!(err, SpanPipelineError::SensorLaunch(_)));
    }
}
