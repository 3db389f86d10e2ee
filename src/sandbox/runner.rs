use std::time::Duration;

use boa_engine::{Context, Source};
use serde_json::Value;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use uuid::Uuid;

use super::error::SandboxError;
use super::protocol::{SandboxRequest, WorkerMessage};

/// Default wall-clock budget for one execution.
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;
/// Serialized results above this size are rejected even when the
/// computation itself succeeded.
pub const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// Resource limits and the global allow-list for the sandbox.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub default_timeout_ms: u64,
    pub max_output_bytes: usize,
    pub max_code_bytes: usize,
    /// Interpreter-level iteration cap so an abandoned worker halts on its
    /// own shortly after the watchdog gives up on it.
    pub loop_iteration_limit: u64,
    pub recursion_limit: usize,
    /// Globals left visible to user code; everything else is deleted from
    /// the global object before the code runs.
    pub allowed_globals: Vec<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        SandboxConfig {
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            max_output_bytes: MAX_OUTPUT_BYTES,
            max_code_bytes: 256 * 1024,
            loop_iteration_limit: 10_000_000,
            recursion_limit: 512,
            allowed_globals: vec![
                "JSON".into(),
                "Math".into(),
                "Number".into(),
                "String".into(),
                "Boolean".into(),
                "Array".into(),
                "Object".into(),
                "Date".into(),
                "Error".into(),
                "parseInt".into(),
                "parseFloat".into(),
                "isNaN".into(),
                "isFinite".into(),
                "NaN".into(),
                "Infinity".into(),
                "undefined".into(),
                "globalThis".into(),
            ],
        }
    }
}

/// Result of a successful sandbox execution.
#[derive(Debug, Clone)]
pub struct SandboxOutcome {
    pub result: Value,
    /// `console.log` lines forwarded from the worker, in emission order.
    pub console: Vec<String>,
}

/// Executes untrusted code on a per-request worker thread with a watchdog.
pub struct SandboxRunner {
    config: SandboxConfig,
}

impl SandboxRunner {
    pub fn new(config: SandboxConfig) -> Self {
        SandboxRunner { config }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Run `code` with `inputs` bound to `input` and a frozen copy of
    /// `variables` in scope. The watchdog fires after `timeout_ms`
    /// (falling back to the configured default), tearing the worker down
    /// unconditionally.
    ///
    /// Dropping the returned future (e.g. when racing an abort signal)
    /// performs the same teardown as a watchdog fire.
    pub async fn execute(
        &self,
        code: &str,
        inputs: &Value,
        variables: &Value,
        timeout_ms: Option<u64>,
    ) -> Result<SandboxOutcome, SandboxError> {
        if code.len() > self.config.max_code_bytes {
            return Err(SandboxError::CodeTooLarge {
                max: self.config.max_code_bytes,
                actual: code.len(),
            });
        }
        let timeout_ms = timeout_ms.unwrap_or(self.config.default_timeout_ms);
        let request = SandboxRequest {
            id: Uuid::new_v4().to_string(),
            code: code.to_string(),
            inputs: inputs.clone(),
            variables: variables.clone(),
            timeout_ms,
        };

        let (req_tx, req_rx) = std::sync::mpsc::channel::<SandboxRequest>();
        let (msg_tx, mut msg_rx) = unbounded_channel::<WorkerMessage>();
        let worker_config = self.config.clone();
        std::thread::Builder::new()
            .name("nodeflow-sandbox".into())
            .spawn(move || worker_main(worker_config, req_rx, msg_tx))
            .map_err(|e| SandboxError::WorkerUnavailable(e.to_string()))?;

        // Handshake: the worker must announce itself before the request ships.
        match tokio::time::timeout(Duration::from_secs(5), msg_rx.recv()).await {
            Ok(Some(WorkerMessage::Ready)) => {}
            _ => {
                return Err(SandboxError::WorkerUnavailable(
                    "worker did not complete the ready handshake".into(),
                ))
            }
        }
        req_tx
            .send(request)
            .map_err(|_| SandboxError::WorkerUnavailable("worker went away".into()))?;

        let deadline = tokio::time::sleep(Duration::from_millis(timeout_ms));
        tokio::pin!(deadline);

        let mut console = Vec::new();
        loop {
            tokio::select! {
                msg = msg_rx.recv() => match msg {
                    Some(WorkerMessage::Console { data }) => console.push(data),
                    Some(WorkerMessage::Success { result, .. }) => {
                        let serialized = serde_json::to_vec(&result)
                            .map_err(|e| SandboxError::Serialization(e.to_string()))?;
                        if serialized.len() > self.config.max_output_bytes {
                            return Err(SandboxError::SizeLimit {
                                max_bytes: self.config.max_output_bytes,
                                actual_bytes: serialized.len(),
                            });
                        }
                        return Ok(SandboxOutcome { result, console });
                    }
                    Some(WorkerMessage::Error { error, .. }) => {
                        return Err(SandboxError::Runtime(error));
                    }
                    Some(WorkerMessage::Ready) => {}
                    None => {
                        return Err(SandboxError::WorkerUnavailable(
                            "worker exited without a response".into(),
                        ));
                    }
                },
                _ = &mut deadline => {
                    // Returning drops both channel ends: the worker can no
                    // longer reach the host, and its interpreter limits stop
                    // it shortly after. Nothing it sends is observable.
                    tracing::warn!(timeout_ms, "sandbox watchdog fired, worker torn down");
                    return Err(SandboxError::Timeout { timeout_ms });
                }
            }
        }
    }
}

impl Default for SandboxRunner {
    fn default() -> Self {
        SandboxRunner::new(SandboxConfig::default())
    }
}

/// Worker entry point: one handshake, one request, one response.
fn worker_main(
    config: SandboxConfig,
    req_rx: std::sync::mpsc::Receiver<SandboxRequest>,
    msg_tx: UnboundedSender<WorkerMessage>,
) {
    if msg_tx.send(WorkerMessage::Ready).is_err() {
        return;
    }
    let Ok(request) = req_rx.recv() else {
        return;
    };
    match run_script(&config, &request) {
        Ok((result, console)) => {
            for line in console {
                if msg_tx.send(WorkerMessage::Console { data: line }).is_err() {
                    // Host already tore us down.
                    return;
                }
            }
            let _ = msg_tx.send(WorkerMessage::Success {
                id: request.id.clone(),
                result,
            });
        }
        Err(error) => {
            let _ = msg_tx.send(WorkerMessage::Error {
                id: request.id.clone(),
                error,
            });
        }
    }
}

fn run_script(
    config: &SandboxConfig,
    request: &SandboxRequest,
) -> Result<(Value, Vec<String>), String> {
    let mut context = Context::default();
    let limits = context.runtime_limits_mut();
    limits.set_loop_iteration_limit(config.loop_iteration_limit);
    limits.set_recursion_limit(config.recursion_limit);

    let script = build_script(
        &request.code,
        &request.inputs,
        &request.variables,
        &config.allowed_globals,
    )?;

    let value = context
        .eval(Source::from_bytes(&script))
        .map_err(|e| e.to_string())?;

    let wrapper_json = value
        .as_string()
        .map(|s| s.to_std_string_escaped())
        .ok_or_else(|| "code did not produce a JSON-serializable result".to_string())?;
    let wrapper: Value = serde_json::from_str(&wrapper_json)
        .map_err(|e| format!("failed to parse sandbox result: {}", e))?;

    let result = wrapper.get("result").cloned().unwrap_or(Value::Null);
    let console = wrapper
        .get("console")
        .and_then(Value::as_array)
        .map(|lines| {
            lines
                .iter()
                .filter_map(|l| l.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    Ok((result, console))
}

/// Assemble the full script: strip globals to the allow-list, install the
/// restricted console, bind `input` and a frozen `variables`, then run the
/// user code as a function body.
fn build_script(
    code: &str,
    inputs: &Value,
    variables: &Value,
    allowed: &[String],
) -> Result<String, String> {
    let inputs_json = escape_for_single_quotes(
        &serde_json::to_string(inputs).map_err(|e| e.to_string())?,
    );
    let variables_json = escape_for_single_quotes(
        &serde_json::to_string(variables).map_err(|e| e.to_string())?,
    );
    let allowed_entries = allowed
        .iter()
        .map(|name| format!("__allowed[{:?}] = true;", name))
        .collect::<Vec<_>>()
        .join("\n");

    Ok(format!(
        r#"
(function() {{
    var __global = (typeof globalThis !== 'undefined') ? globalThis : this;
    var __allowed = {{}};
{allowed_entries}
    Object.getOwnPropertyNames(__global).forEach(function(key) {{
        if (!__allowed[key]) {{
            try {{ delete __global[key]; }} catch (e) {{ __global[key] = undefined; }}
        }}
    }});
}})();
var __console_logs = [];
var console = {{
    log: function() {{
        var parts = [];
        for (var i = 0; i < arguments.length; i++) {{
            if (typeof arguments[i] === 'object') {{
                parts.push(JSON.stringify(arguments[i]));
            }} else {{
                parts.push(String(arguments[i]));
            }}
        }}
        __console_logs.push(parts.join(' '));
    }},
    warn: function() {{ console.log.apply(null, arguments); }},
    error: function() {{ console.log.apply(null, arguments); }},
    info: function() {{ console.log.apply(null, arguments); }}
}};
var input = JSON.parse('{inputs_json}');
var variables = Object.freeze(JSON.parse('{variables_json}'));
var __result = (function(input, variables) {{
{code}
}})(input, variables);
JSON.stringify({{ "result": __result === undefined ? null : __result, "console": __console_logs }});
"#
    ))
}

fn escape_for_single_quotes(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Instant;

    fn runner() -> SandboxRunner {
        SandboxRunner::default()
    }

    #[tokio::test]
    async fn doubles_its_input() {
        let outcome = runner()
            .execute("return input * 2", &json!(21), &json!({}), Some(5000))
            .await
            .unwrap();
        assert_eq!(outcome.result, json!(42));
    }

    #[tokio::test]
    async fn object_inputs_and_console() {
        let outcome = runner()
            .execute(
                "console.log('processing', input.n); return { doubled: input.n * 2 };",
                &json!({ "n": 7 }),
                &json!({}),
                None,
            )
            .await
            .unwrap();
        assert_eq!(outcome.result, json!({ "doubled": 14 }));
        assert_eq!(outcome.console, vec!["processing 7".to_string()]);
    }

    #[tokio::test]
    async fn infinite_loop_times_out_within_margin() {
        let start = Instant::now();
        let err = runner()
            .execute("while(true){}", &json!(null), &json!({}), Some(100))
            .await
            .unwrap_err();
        let elapsed = start.elapsed();
        match err {
            SandboxError::Timeout { timeout_ms } => assert_eq!(timeout_ms, 100),
            other => panic!("expected Timeout, got {:?}", other),
        }
        assert!(
            elapsed < Duration::from_millis(600),
            "watchdog overshoot too large: {:?}",
            elapsed
        );
    }

    #[tokio::test]
    async fn oversized_result_is_rejected() {
        let config = SandboxConfig {
            max_output_bytes: 1024,
            ..SandboxConfig::default()
        };
        let err = SandboxRunner::new(config)
            .execute(
                "var s = 'x'; while (s.length < 4096) { s = s + s; } return s;",
                &json!(null),
                &json!({}),
                Some(5000),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::SizeLimit { .. }));
    }

    #[tokio::test]
    async fn default_output_cap_is_ten_mebibytes() {
        assert_eq!(SandboxConfig::default().max_output_bytes, 10 * 1024 * 1024);
    }

    #[tokio::test]
    async fn runtime_errors_surface() {
        let err = runner()
            .execute("throw new Error('bad input')", &json!(null), &json!({}), None)
            .await
            .unwrap_err();
        match err {
            SandboxError::Runtime(message) => assert!(message.contains("bad input")),
            other => panic!("expected Runtime, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn variables_are_frozen_copies() {
        let outcome = runner()
            .execute(
                "variables.x = 99; return variables.x;",
                &json!(null),
                &json!({ "x": 1 }),
                None,
            )
            .await
            .unwrap();
        assert_eq!(outcome.result, json!(1));
    }

    #[tokio::test]
    async fn no_ambient_host_capabilities() {
        let outcome = runner()
            .execute(
                "return [typeof fetch, typeof XMLHttpRequest, typeof require, typeof process];",
                &json!(null),
                &json!({}),
                None,
            )
            .await
            .unwrap();
        assert_eq!(
            outcome.result,
            json!(["undefined", "undefined", "undefined", "undefined"])
        );
    }

    #[tokio::test]
    async fn allow_listed_primitives_remain() {
        let outcome = runner()
            .execute(
                "return JSON.stringify({ m: Math.max(1, 2), p: parseInt('7') });",
                &json!(null),
                &json!({}),
                None,
            )
            .await
            .unwrap();
        assert_eq!(outcome.result, json!("{\"m\":2,\"p\":7}"));
    }

    #[tokio::test]
    async fn oversized_code_rejected_before_spawn() {
        let config = SandboxConfig {
            max_code_bytes: 16,
            ..SandboxConfig::default()
        };
        let err = SandboxRunner::new(config)
            .execute(
                "return 1; // padding padding padding",
                &json!(null),
                &json!({}),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::CodeTooLarge { .. }));
    }

    #[tokio::test]
    async fn undefined_result_becomes_null() {
        let outcome = runner()
            .execute("var unused = 1;", &json!(null), &json!({}), None)
            .await
            .unwrap();
        assert_eq!(outcome.result, Value::Null);
    }
}
