//! Scripted in-memory remote shell for tests.
//!
//! A [`FakeShell`] behaves like the far end of the hop chain: it echoes each
//! line it receives, answers through a reply function, prints a prompt, and
//! can emulate a follow-mode command that emits a line every few
//! milliseconds until it receives Ctrl-C. Time is tokio time, so tests run
//! with a paused clock.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::{ChannelError, Result, TransportError};
use crate::transport::{Connector, ShellChannel};

pub(crate) const PROMPT: &str = "svc@internal:~$ ";

/// What the fake remote does with one received line.
pub(crate) enum Reply {
    /// Echo, print `body`, print the prompt.
    Output(String),
    /// Echo, then emit `"{prefix} {n}"` lines every `every` until Ctrl-C.
    Follow { prefix: String, every: Duration },
    /// Echo and nothing else (a hung command).
    Silence,
}

pub(crate) type Handler = Arc<dyn Fn(&str) -> Reply + Send + Sync>;

/// Handler answering the connect hops, delegating everything else.
pub(crate) fn with_hops<F>(handler: F) -> Handler
where
    F: Fn(&str) -> Reply + Send + Sync + 'static,
{
    Arc::new(move |line: &str| {
        if line.starts_with("ssh ") || line.starts_with("sudo su - ") {
            Reply::Output(String::new())
        } else {
            handler(line)
        }
    })
}

struct Follow {
    prefix: String,
    every: Duration,
    next_at: Instant,
    count: usize,
}

pub(crate) struct FakeState {
    pending: VecDeque<Vec<u8>>,
    partial: String,
    follow: Option<Follow>,
    handler: Handler,
    pub sent: Vec<String>,
    pub interrupts: usize,
    pub open: bool,
    pub closed: bool,
}

impl FakeState {
    fn new(handler: Handler) -> Self {
        Self {
            pending: VecDeque::from([b"Last login: Mon Oct 19\r\njump:~$ ".to_vec()]),
            partial: String::new(),
            follow: None,
            handler,
            sent: Vec::new(),
            interrupts: 0,
            open: true,
            closed: false,
        }
    }

    fn push(&mut self, text: String) {
        self.pending.push_back(text.into_bytes());
    }

    fn receive_line(&mut self, line: String) {
        let reply = (self.handler)(&line);
        match reply {
            Reply::Output(body) => {
                let mut text = format!("{}\r\n{}", line, body);
                if !body.is_empty() && !body.ends_with('\n') {
                    text.push_str("\r\n");
                }
                text.push_str(PROMPT);
                self.push(text);
            }
            Reply::Follow { prefix, every } => {
                self.push(format!("{}\r\n", line));
                self.follow = Some(Follow {
                    prefix,
                    every,
                    next_at: Instant::now() + every,
                    count: 0,
                });
            }
            Reply::Silence => self.push(format!("{}\r\n", line)),
        }
        self.sent.push(line);
    }
}

/// One fake shell; the state stays observable through [`FakeShell::state`].
pub(crate) struct FakeShell {
    state: Arc<Mutex<FakeState>>,
}

impl FakeShell {
    pub(crate) fn new(handler: Handler) -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState::new(handler))),
        }
    }

    pub(crate) fn state(&self) -> Arc<Mutex<FakeState>> {
        self.state.clone()
    }
}

#[async_trait]
impl ShellChannel for FakeShell {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.open {
            return Err(ChannelError::Closed.into());
        }

        if data == [0x03] {
            state.interrupts += 1;
            state.follow = None;
            state.push(format!("^C\r\n{}", PROMPT));
            return Ok(());
        }

        state.partial.push_str(&String::from_utf8_lossy(data));
        while let Some(pos) = state.partial.find('\n') {
            let line: String = state.partial.drain(..=pos).collect();
            state.receive_line(line.trim_end_matches(['\r', '\n']).to_string());
        }
        Ok(())
    }

    fn try_read(&mut self) -> Result<Option<Vec<u8>>> {
        let mut state = self.state.lock().unwrap();
        if !state.open {
            return Err(ChannelError::Closed.into());
        }
        if let Some(chunk) = state.pending.pop_front() {
            return Ok(Some(chunk));
        }
        if let Some(follow) = state.follow.as_mut()
            && Instant::now() >= follow.next_at
        {
            follow.count += 1;
            follow.next_at += follow.every;
            let line = format!("{} {}\r\n", follow.prefix, follow.count);
            return Ok(Some(line.into_bytes()));
        }
        Ok(None)
    }

    fn is_open(&self) -> bool {
        self.state.lock().unwrap().open
    }

    async fn close(&mut self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.open = false;
        state.closed = true;
        Ok(())
    }
}

/// Connector handing out [`FakeShell`]s and remembering them.
pub(crate) struct FakeConnector {
    handler: Handler,
    shells: Mutex<Vec<Arc<Mutex<FakeState>>>>,
    refuse: Mutex<bool>,
}

impl FakeConnector {
    pub(crate) fn new(handler: Handler) -> Arc<Self> {
        Arc::new(Self {
            handler,
            shells: Mutex::new(Vec::new()),
            refuse: Mutex::new(false),
        })
    }

    /// Make the next connections fail authentication.
    pub(crate) fn refuse(&self, refuse: bool) {
        *self.refuse.lock().unwrap() = refuse;
    }

    pub(crate) fn shells(&self) -> Vec<Arc<Mutex<FakeState>>> {
        self.shells.lock().unwrap().clone()
    }

    pub(crate) fn shell(&self, index: usize) -> Arc<Mutex<FakeState>> {
        self.shells.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn open_shell(&self, _jump_host: &str) -> Result<Box<dyn ShellChannel>> {
        if *self.refuse.lock().unwrap() {
            return Err(TransportError::AuthenticationFailed {
                user: "deploy".to_string(),
            }
            .into());
        }
        let shell = FakeShell::new(self.handler.clone());
        self.shells.lock().unwrap().push(shell.state());
        Ok(Box::new(shell))
    }
}
