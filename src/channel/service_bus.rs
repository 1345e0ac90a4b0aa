// Host service collaborators used to obtain an app channel socket URL
// Both are callback-based: the caller chains further work off each response

use serde_json::Value;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

/// Invoked once per service response; subscriptions may respond many times
pub type ServiceCallback = Box<dyn FnMut(Value) + Send>;

/// Invoked exactly once with the native call's response
pub type NativeCallback = Box<dyn FnOnce(Value) + Send>;

/// The host's local service bus (luna on webOS)
pub trait ServiceBus: Send + Sync {
    fn call(&self, uri: &str, params: Value, on_response: ServiceCallback);
}

/// The host's alternative app channel creation call
pub trait NativeChannelFactory: Send + Sync {
    fn create_app_channel(&self, params: &str, on_response: NativeCallback);
}

/// Service bus reached through the `luna-send` command line tool
pub struct LunaSendBus {
    program: String,
}

impl LunaSendBus {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl ServiceBus for LunaSendBus {
    fn call(&self, uri: &str, params: Value, mut on_response: ServiceCallback) {
        let subscribe = params.get("subscribe").and_then(Value::as_bool) == Some(true);
        let mut command = Command::new(&self.program);
        if subscribe {
            // Interactive mode prints one response line per subscription update
            command.arg("-i");
        } else {
            command.args(["-n", "1"]);
        }
        command
            .arg(uri)
            .arg(params.to_string())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let uri = uri.to_string();
        tokio::spawn(async move {
            let mut child = match command.spawn() {
                Ok(child) => child,
                Err(e) => {
                    warn!("Failed to call {}: {}", uri, e);
                    return;
                }
            };
            let Some(stdout) = child.stdout.take() else {
                return;
            };

            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => match serde_json::from_str::<Value>(&line) {
                        Ok(response) => {
                            debug!("{} responded: {}", uri, response);
                            on_response(response);
                        }
                        Err(_) => debug!("Ignoring non-JSON output from {}: {}", uri, line),
                    },
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Reading response of {} failed: {}", uri, e);
                        break;
                    }
                }
            }

            let _ = child.wait().await;
        });
    }
}

/// Native creation call backed by an external program that prints one JSON
/// response (`{"socketUrl": ...}`) on stdout
pub struct CommandChannelFactory {
    program: String,
    args: Vec<String>,
}

impl CommandChannelFactory {
    /// `command` is the program followed by its arguments; empty means none configured
    pub fn from_command(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl NativeChannelFactory for CommandChannelFactory {
    fn create_app_channel(&self, params: &str, on_response: NativeCallback) {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(params)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let program = self.program.clone();
        tokio::spawn(async move {
            let output = async {
                let mut child = command.spawn()?;
                let mut buf = String::new();
                if let Some(mut stdout) = child.stdout.take() {
                    stdout.read_to_string(&mut buf).await?;
                }
                child.wait().await?;
                anyhow::Ok(buf)
            }
            .await;

            match output {
                Ok(buf) => match serde_json::from_str::<Value>(buf.trim()) {
                    Ok(response) => on_response(response),
                    Err(e) => warn!("{} printed an invalid channel response: {}", program, e),
                },
                Err(e) => warn!("Native channel command {} failed: {}", program, e),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_factory_requires_program() {
        assert!(CommandChannelFactory::from_command(&[]).is_none());

        let factory = CommandChannelFactory::from_command(&[
            "create-channel".to_string(),
            "--json".to_string(),
        ])
        .unwrap();
        assert_eq!(factory.program, "create-channel");
        assert_eq!(factory.args, vec!["--json"]);
    }
}
