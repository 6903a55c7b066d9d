#![allow(dead_code)]

use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;
use uiaflow::platforms::memory::MemoryEngine;
use uiaflow::UiaRpcService;
use uiaflow_agent::serve;
use uiaflow_runner::{AgentRpc, RunnerConfig, SequenceOptions, StreamChannel};

pub type DuplexRpc = AgentRpc<StreamChannel<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>>;

pub const PROGRAM: &str = "PROGRAM Main\r\n  VAR x : INT; END_VAR\r\n  x := x + 1;\r\nEND_PROGRAM\r\n";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("uiaflow=debug,uiaflow_runner=debug")
        .with_test_writer()
        .try_init();
}

/// In-process agent over the demo tree, reachable through `rpc`
pub struct Agent {
    pub engine: MemoryEngine,
    pub rpc: DuplexRpc,
    server: JoinHandle<anyhow::Result<()>>,
}

impl Agent {
    pub async fn start() -> Self {
        init_tracing();
        let engine = MemoryEngine::demo().expect("demo tree");
        let service = Arc::new(UiaRpcService::new(Arc::new(engine.clone())));
        let (client, server) = tokio::io::duplex(256 * 1024);
        let (server_read, mut server_write) = tokio::io::split(server);
        server_write
            .write_all(b"READY\n")
            .await
            .expect("ready line written");
        let server = tokio::spawn(serve(service, server_read, server_write));
        let (client_read, client_write) = tokio::io::split(client);
        Self {
            engine,
            rpc: AgentRpc::new(StreamChannel::new(client_read, client_write)),
            server,
        }
    }

    pub async fn stop(mut self) {
        self.rpc.shutdown().await;
        self.server
            .await
            .expect("server task joins")
            .expect("server exits cleanly");
    }
}

/// A channel whose peer prints `line` instead of the ready token and never answers.
pub async fn silent_peer(line: &str) -> (DuplexRpc, DuplexStream) {
    let (client, mut peer) = tokio::io::duplex(4 * 1024);
    peer.write_all(format!("{line}\n").as_bytes())
        .await
        .expect("line written");
    let (client_read, client_write) = tokio::io::split(client);
    (AgentRpc::new(StreamChannel::new(client_read, client_write)), peer)
}

fn selector(automation_id: &str) -> Value {
    json!({ "path": [{ "automationId": automation_id }] })
}

fn profile(keys: &[(&str, &str)]) -> Value {
    let selectors: serde_json::Map<String, Value> = keys
        .iter()
        .map(|(key, id)| (key.to_string(), selector(id)))
        .collect();
    json!({ "schemaVersion": 1, "selectors": selectors })
}

pub fn write_json(path: &Path, value: &Value) {
    std::fs::write(path, serde_json::to_string_pretty(value).expect("json encodes")).expect("file written");
}

/// v1 selector pack mapped onto the demo target
pub fn write_demo_selectors(root: &Path) {
    std::fs::create_dir_all(root).expect("selectors dir");
    write_json(
        &root.join("autothink.v1.base.json"),
        &profile(&[
            ("global.popupRoot", "startupDialog"),
            ("global.popupOkButton", "popupOkButton"),
        ]),
    );
    write_json(&root.join("autothink.attach.json"), &profile(&[("mainWindow", "MainForm")]));
    write_json(
        &root.join("autothink.importVariables.json"),
        &profile(&[
            ("importVariablesMenuOrButton", "openImportButton"),
            ("importVariablesDialogRoot", "importDialog"),
            ("importVariablesFilePathEdit", "filePathEdit"),
            ("importVariablesOkButton", "importOkButton"),
            ("importVariablesDoneIndicator", "importDialog"),
        ]),
    );
    write_json(
        &root.join("autothink.importProgram.textPaste.json"),
        &profile(&[
            ("importProgramMenuOrButton", "importProgramButton"),
            ("programEditorRoot", "programEditor"),
            ("programEditorTextArea", "programEditor"),
            ("programPastedIndicator", "programPasteIndicator"),
        ]),
    );
    write_json(
        &root.join("autothink.build.json"),
        &profile(&[
            ("buildButton", "buildButton"),
            ("buildStatus", "statusLabel"),
            ("buildSucceededIndicator", "buildSucceededIndicator"),
        ]),
    );
}

pub fn demo_config() -> Value {
    json!({
        "selectorPackVersion": "v1",
        "session": { "processName": "Autothink.DemoTarget", "timeoutMs": 2000 },
        "programTextPath": "program.st",
        "variablesFilePath": "vars.xlsx",
        "flowTimeoutMs": 15000,
        "importVariables": {
            "searchRoot": "desktop",
            "openImportSelectorKey": "importVariablesMenuOrButton",
            "dialogSelectorKey": "importVariablesDialogRoot",
            "filePathEditorSelectorKey": "importVariablesFilePathEdit",
            "confirmButtonSelectorKey": "importVariablesOkButton",
            "successCondition": { "kind": "ElementNotExists", "selectorKey": "importVariablesDoneIndicator" },
            "findTimeoutMs": 1000,
            "waitTimeoutMs": 2000
        },
        "importProgram": {
            "openProgramSteps": [{ "action": "click", "selectorKey": "importProgramMenuOrButton" }],
            "editorSelectorKey": "programEditorTextArea",
            "afterPasteWaitMs": 0,
            "verifyTimeoutMs": 300,
            "findTimeoutMs": 1000,
            "clipboardRetry": { "times": 3, "intervalMs": 0 }
        },
        "build": {
            "buildButtonSelectorKey": "buildButton",
            "waitCondition": { "kind": "ElementExists", "selectorKey": "buildSucceededIndicator" },
            "timeoutMs": 3000,
            "findTimeoutMs": 1000,
            "buildOutcome": {
                "mode": "waitSelector",
                "successSelectorKey": "buildSucceededIndicator",
                "timeoutMs": 500
            }
        }
    })
}

/// Config directory with selectors, program text and a run directory
pub struct Workspace {
    pub dir: tempfile::TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        write_demo_selectors(&dir.path().join("selectors"));
        std::fs::write(dir.path().join("program.st"), PROGRAM).expect("program written");
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn selectors(&self) -> PathBuf {
        self.path().join("selectors")
    }

    pub fn options(&self, config: Value) -> SequenceOptions {
        let config: RunnerConfig = serde_json::from_value(config).expect("config parses");
        SequenceOptions {
            config,
            config_dir: self.path().to_path_buf(),
            selectors_root: self.selectors(),
            profile: "autothink".to_string(),
            run_dir: self.path().join("logs").join("run"),
            agent_path: "in-process".to_string(),
            check_timeout_ms: 2000,
            skip_check: false,
        }
    }
}
