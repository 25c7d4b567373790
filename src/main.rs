//! Mindmap Agent - 命令行交互入口
//!
//! 初始化日志与配置，构建编排器（内存版 mindmap），在终端中逐行对话。
//! 命令：/state /rollback /reset /level <L0-L4> /pick <n> /topic /clear /quit

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use mindmap_agent::config::load_config;
use mindmap_agent::context::{render_context, ContextProvider, InMemoryPlanner};
use mindmap_agent::core::{create_llm_from_config, OrchestratorBuilder};
use mindmap_agent::llm::LearnerLevel;
use mindmap_agent::observability;
use mindmap_agent::tools::{ActionForm, ActionKind};
use mindmap_agent::Orchestrator;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;
    let llm = create_llm_from_config(&cfg).context("Failed to create LLM client")?;

    let planner = Arc::new(InMemoryPlanner::new());
    let mut orch = OrchestratorBuilder::from_config(&cfg, llm)
        .context("Failed to load registries")?
        .with_mutation_api(planner.clone())
        .with_context(planner.clone())
        .build()
        .context("Failed to build orchestrator")?;

    let initial_state = cfg.orchestrator.initial_state.clone();
    let mut last_form: Option<ActionForm> = None;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    println!(
        "{} ready (state: {})，输入 /quit 退出",
        cfg.app.name.as_deref().unwrap_or("mindmap-agent"),
        orch.controller().current_state()
    );

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut parts = line.splitn(2, ' ');
        match (parts.next().unwrap_or_default(), parts.next().map(str::trim)) {
            ("/quit", _) => break,
            ("/state", _) => {
                let snap = orch.controller().snapshot();
                println!("state: {}  history: {:?}", snap.current, snap.history);
                println!("tools: {:?}", orch.controller().available_tools());
            }
            ("/rollback", _) => {
                if orch.controller_mut().rollback() {
                    println!("rolled back to {}", orch.controller().current_state());
                } else {
                    println!("nothing to roll back");
                }
            }
            ("/reset", _) => {
                orch.controller_mut().reset(initial_state.clone());
                orch.clear_history();
                last_form = None;
                println!("reset to {initial_state}");
            }
            ("/level", Some(level)) => match level.parse::<LearnerLevel>() {
                Ok(level) => orch.set_level(level),
                Err(e) => println!("{e}"),
            },
            ("/level", None) => println!("level: {}", orch.level()),
            ("/topic", _) => println!("{}", render_context(planner.snapshot().as_ref())),
            ("/clear", _) => {
                orch.clear_history();
                println!("conversation cleared");
            }
            ("/pick", Some(n)) => {
                let picked = n
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| i.checked_sub(1))
                    .and_then(|i| last_form.as_ref().and_then(|f| f.options.get(i)))
                    .cloned();
                let Some(option) = picked else {
                    println!("no such option");
                    continue;
                };
                let call = option.to_call();
                if call.kind == ActionKind::Chat {
                    last_form = respond(&mut orch, &option.label).await;
                    continue;
                }
                match orch.execute_action(&call).await {
                    Ok(result) => println!("✓ {} {}", call.kind, result),
                    Err(e) => println!("✗ {e}"),
                }
                last_form = None;
            }
            _ => last_form = respond(&mut orch, line).await,
        }
    }

    let (prompt, completion, total) = orch.chat().token_usage();
    tracing::info!(prompt, completion, total, "token usage");
    Ok(())
}

/// 送出一条输入并打印回复；返回回复中的选项以便 /pick
async fn respond(orch: &mut Orchestrator, input: &str) -> Option<ActionForm> {
    match orch.handle_user_input(input).await {
        Ok(resp) => {
            if let Some(message) = resp.message.as_deref() {
                println!("{message}");
            }
            if let Some(form) = &resp.form {
                println!("[{}] {}", form.title, form.description);
                for (i, opt) in form.options.iter().enumerate() {
                    println!("  {}. {}", i + 1, opt.label);
                }
            }
            resp.form
        }
        Err(e) => {
            println!("{e}");
            None
        }
    }
}
