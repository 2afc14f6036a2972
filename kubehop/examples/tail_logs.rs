//! Follow a pod's logs and metrics through the configured hop chain.
//!
//! Reads the hop chain from `ARGO_*` environment variables, connects,
//! then streams logs and polls metrics for the named pod until Ctrl-C.
//!
//! # Usage
//!
//! ```bash
//! ARGO_JUMP_HOST=bastion ARGO_INTERNAL_HOST=10.1.2.3 \
//!     cargo run --example tail_logs -- worker-7f9c
//! ```

use std::env;
use std::io::{self, Write};
use std::time::Duration;

use kubehop::{Action, Config, TaskDispatcher, TaskEvent};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Some(pod) = env::args().nth(1) else {
        eprintln!("Usage: tail_logs <pod>");
        std::process::exit(1);
    };

    let config = Config::from_env()?;
    let (dispatcher, mut events) = TaskDispatcher::new(config)?;

    let mut connect = dispatcher.dispatch(Action::Connect);
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                TaskEvent::Output(text) => {
                    print!("{}", text);
                    let _ = io::stdout().flush();
                }
                TaskEvent::Metrics(sample) => eprintln!("[METRICS] {}", sample),
                other => eprintln!("[EVENT] {}", other),
            }
        }
    });

    connect.finished().await;
    if !dispatcher.is_connected().await {
        eprintln!("Connection failed");
        dispatcher.dispatch(Action::Disconnect).finished().await;
        return Ok(());
    }

    dispatcher.dispatch(Action::StreamLogs { pod: pod.clone() });
    dispatcher.dispatch(Action::PollMetrics { pod });

    tokio::signal::ctrl_c().await?;
    eprintln!("\nStopping...");

    dispatcher.dispatch(Action::Disconnect).finished().await;
    drop(dispatcher);
    let _ = tokio::time::timeout(Duration::from_secs(1), printer).await;

    println!("Done!");
    Ok(())
}
