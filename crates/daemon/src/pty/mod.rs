// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PTY session manager: ordered multi-terminal lifecycle.
//!
//! Sessions are identified by client-supplied ids, scoped to one workspace
//! (each workspace runtime owns a manager) and tagged with the owning user.
//! A session outlives its WebSocket: disconnection orphans it (the attached
//! sink is cleared) but the process keeps running and its output keeps
//! filling the ring buffer. Reattach returns a scrollback snapshot taken
//! atomically with the sink attachment, so the viewer sees scrollback
//! followed by newer bytes with no loss or duplication at the boundary.

mod ring;

pub use ring::OutputRing;

use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use portable_pty::{native_pty_system, ChildKiller, CommandBuilder, MasterPty, PtySize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use sam_core::{PtySessionStatus, SessionId, UserId};

/// Errors from PTY session operations.
#[derive(Debug, Error)]
pub enum PtyError {
    #[error("session already exists: {0}")]
    AlreadyExists(SessionId),

    #[error("session not found: {0}")]
    NotFound(SessionId),

    #[error("not authorized")]
    NotAuthorized,

    #[error("pty spawn failed: {0}")]
    Spawn(String),

    #[error("pty io error: {0}")]
    Io(String),
}

/// Event forwarded to the attached sink.
#[derive(Debug, Clone, PartialEq)]
pub enum PtyEvent {
    Output(Vec<u8>),
    Closed { reason: String },
}

/// The attached writer: a bounded channel into the WebSocket writer task.
/// Forwarding never blocks; a full channel just drops the live chunk (the
/// ring buffer still advances, so nothing is lost from scrollback).
pub type PtySink = mpsc::Sender<PtyEvent>;

/// Command to run inside the PTY.
#[derive(Debug, Clone)]
pub struct PtyCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<String>,
    pub env: Vec<(String, String)>,
}

impl PtyCommand {
    /// Host shell fallback used when container mode is off.
    pub fn shell(cwd: Option<String>) -> Self {
        let program = std::env::var("SHELL").unwrap_or_else(|_| "/bin/bash".to_string());
        Self { program, args: vec!["-l".to_string()], cwd, env: Vec::new() }
    }
}

/// Snapshot of one session's metadata.
#[derive(Debug, Clone)]
pub struct PtySessionInfo {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub name: String,
    pub status: PtySessionStatus,
    pub rows: u16,
    pub cols: u16,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

struct SessionMeta {
    name: String,
    status: PtySessionStatus,
    rows: u16,
    cols: u16,
    created_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
}

/// Ring buffer plus the attached sink, guarded together so the scrollback
/// snapshot and sink swap are a single atomic step relative to the reader.
struct AttachState {
    ring: OutputRing,
    sink: Option<PtySink>,
}

struct SessionEntry {
    session_id: SessionId,
    user_id: UserId,
    meta: Mutex<SessionMeta>,
    attach: Arc<Mutex<AttachState>>,
    writer: Mutex<Box<dyn Write + Send>>,
    master: Mutex<Box<dyn MasterPty + Send>>,
    killer: Mutex<Box<dyn ChildKiller + Send + Sync>>,
}

impl SessionEntry {
    fn require_user(&self, user_id: &UserId) -> Result<(), PtyError> {
        if &self.user_id == user_id {
            Ok(())
        } else {
            Err(PtyError::NotAuthorized)
        }
    }

    fn info(&self) -> PtySessionInfo {
        let meta = self.meta.lock();
        PtySessionInfo {
            session_id: self.session_id.clone(),
            user_id: self.user_id.clone(),
            name: meta.name.clone(),
            status: meta.status,
            rows: meta.rows,
            cols: meta.cols,
            created_at: meta.created_at,
            last_activity: meta.last_activity,
        }
    }

    fn touch(&self) {
        self.meta.lock().last_activity = Utc::now();
    }
}

struct ManagerInner {
    ring_capacity: usize,
    sessions: Mutex<HashMap<SessionId, Arc<SessionEntry>>>,
}

/// Owns every PTY session of one workspace.
#[derive(Clone)]
pub struct PtySessionManager {
    inner: Arc<ManagerInner>,
}

impl PtySessionManager {
    pub fn new(ring_capacity: usize) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                ring_capacity,
                sessions: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Start a new PTY with a client-supplied id. Fails if the id is live.
    /// The caller's sink is attached immediately; output flows after the
    /// background reader starts.
    pub fn create(
        &self,
        session_id: SessionId,
        user_id: UserId,
        rows: u16,
        cols: u16,
        cmd: PtyCommand,
        sink: PtySink,
    ) -> Result<(), PtyError> {
        let mut sessions = self.inner.sessions.lock();
        if sessions.contains_key(&session_id) {
            return Err(PtyError::AlreadyExists(session_id));
        }

        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize { rows, cols, pixel_width: 0, pixel_height: 0 })
            .map_err(|e| PtyError::Spawn(e.to_string()))?;

        let mut builder = CommandBuilder::new(&cmd.program);
        builder.args(&cmd.args);
        if let Some(cwd) = &cmd.cwd {
            builder.cwd(cwd);
        }
        for (key, value) in &cmd.env {
            builder.env(key, value);
        }

        let mut child =
            pair.slave.spawn_command(builder).map_err(|e| PtyError::Spawn(e.to_string()))?;
        drop(pair.slave);

        let writer = pair.master.take_writer().map_err(|e| PtyError::Spawn(e.to_string()))?;
        let reader =
            pair.master.try_clone_reader().map_err(|e| PtyError::Spawn(e.to_string()))?;
        let killer = child.clone_killer();

        let now = Utc::now();
        let attach = Arc::new(Mutex::new(AttachState {
            ring: OutputRing::new(self.inner.ring_capacity),
            sink: Some(sink),
        }));
        let entry = Arc::new(SessionEntry {
            session_id: session_id.clone(),
            user_id,
            meta: Mutex::new(SessionMeta {
                name: session_id.as_str().to_string(),
                status: PtySessionStatus::Running,
                rows,
                cols,
                created_at: now,
                last_activity: now,
            }),
            attach: Arc::clone(&attach),
            writer: Mutex::new(writer),
            master: Mutex::new(pair.master),
            killer: Mutex::new(killer),
        });
        sessions.insert(session_id.clone(), entry);
        drop(sessions);

        self.start_output_reader(session_id, reader, attach, child);
        Ok(())
    }

    /// Background reader: the single producer for this session's ring.
    /// Every chunk lands in the ring before it is forwarded to the sink, so
    /// an orphaned session keeps accumulating scrollback.
    fn start_output_reader(
        &self,
        session_id: SessionId,
        mut reader: Box<dyn Read + Send>,
        attach: Arc<Mutex<AttachState>>,
        mut child: Box<dyn portable_pty::Child + Send + Sync>,
    ) {
        let inner = Arc::clone(&self.inner);
        std::thread::spawn(move || {
            let mut buf = [0u8; 4096];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        let mut state = attach.lock();
                        state.ring.push(&buf[..n]);
                        if let Some(sink) = &state.sink {
                            // Non-blocking: a slow viewer loses live chunks,
                            // never stalls the child.
                            let _ = sink.try_send(PtyEvent::Output(buf[..n].to_vec()));
                        }
                    }
                }
            }

            let _ = child.wait();
            debug!(session_id = %session_id, "pty child exited");

            // Explicit close already removed the session; only a genuine
            // process exit notifies the attached sink.
            let removed = inner.sessions.lock().remove(&session_id);
            if removed.is_some() {
                let state = attach.lock();
                if let Some(sink) = &state.sink {
                    let _ = sink.try_send(PtyEvent::Closed {
                        reason: "process_exit".to_string(),
                    });
                }
            }
        });
    }

    /// Reattach to a live session: atomically snapshot the ring and install
    /// the new sink, returning the scrollback bytes.
    pub fn reattach(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
        sink: PtySink,
    ) -> Result<Vec<u8>, PtyError> {
        let entry = self.entry(session_id)?;
        entry.require_user(user_id)?;

        let scrollback = {
            let mut state = entry.attach.lock();
            let snapshot = state.ring.snapshot();
            state.sink = Some(sink);
            snapshot
        };
        entry.touch();
        Ok(scrollback)
    }

    /// Whether a sink is currently attached (false once orphaned).
    pub fn is_attached(&self, session_id: &SessionId) -> bool {
        self.inner
            .sessions
            .lock()
            .get(session_id)
            .map(|e| e.attach.lock().sink.is_some())
            .unwrap_or(false)
    }

    /// Detach the sink from each listed session without terminating anything.
    pub fn orphan(&self, session_ids: &[SessionId]) {
        let sessions = self.inner.sessions.lock();
        for id in session_ids {
            if let Some(entry) = sessions.get(id) {
                entry.attach.lock().sink = None;
            }
        }
    }

    /// Write keyboard input to the child.
    pub fn write(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
        data: &[u8],
    ) -> Result<(), PtyError> {
        let entry = self.entry(session_id)?;
        entry.require_user(user_id)?;
        {
            let mut writer = entry.writer.lock();
            writer.write_all(data).map_err(|e| PtyError::Io(e.to_string()))?;
            writer.flush().map_err(|e| PtyError::Io(e.to_string()))?;
        }
        entry.touch();
        Ok(())
    }

    /// Resize the terminal.
    pub fn resize(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
        rows: u16,
        cols: u16,
    ) -> Result<(), PtyError> {
        let entry = self.entry(session_id)?;
        entry.require_user(user_id)?;
        entry
            .master
            .lock()
            .resize(PtySize { rows, cols, pixel_width: 0, pixel_height: 0 })
            .map_err(|e| PtyError::Io(e.to_string()))?;
        let mut meta = entry.meta.lock();
        meta.rows = rows;
        meta.cols = cols;
        Ok(())
    }

    /// Rename the session's tab title.
    pub fn set_name(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
        name: &str,
    ) -> Result<(), PtyError> {
        let entry = self.entry(session_id)?;
        entry.require_user(user_id)?;
        entry.meta.lock().name = name.to_string();
        Ok(())
    }

    /// Terminate the process and remove the session.
    pub fn close(&self, session_id: &SessionId, user_id: &UserId) -> Result<(), PtyError> {
        let entry = {
            let mut sessions = self.inner.sessions.lock();
            let entry = sessions.get(session_id).cloned().ok_or_else(|| {
                PtyError::NotFound(session_id.clone())
            })?;
            entry.require_user(user_id)?;
            sessions.remove(session_id);
            entry
        };
        entry.attach.lock().sink = None;
        if let Err(e) = entry.killer.lock().kill() {
            warn!(session_id = %session_id, error = %e, "pty kill failed");
        }
        Ok(())
    }

    pub fn get(&self, session_id: &SessionId) -> Option<PtySessionInfo> {
        self.inner.sessions.lock().get(session_id).map(|e| e.info())
    }

    /// Live sessions owned by one user.
    pub fn active_sessions_for_user(&self, user_id: &UserId) -> Vec<PtySessionInfo> {
        let mut sessions: Vec<PtySessionInfo> = self
            .inner
            .sessions
            .lock()
            .values()
            .filter(|e| &e.user_id == user_id)
            .map(|e| e.info())
            .collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        sessions
    }

    pub fn session_count(&self) -> usize {
        self.inner.sessions.lock().len()
    }

    /// Whether two handles share the same underlying manager.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Kill every session; used at workspace shutdown.
    pub fn close_all(&self) {
        let entries: Vec<Arc<SessionEntry>> =
            self.inner.sessions.lock().drain().map(|(_, e)| e).collect();
        for entry in entries {
            entry.attach.lock().sink = None;
            if let Err(e) = entry.killer.lock().kill() {
                warn!(session_id = %entry.session_id, error = %e, "pty kill failed");
            }
        }
    }

    fn entry(&self, session_id: &SessionId) -> Result<Arc<SessionEntry>, PtyError> {
        self.inner
            .sessions
            .lock()
            .get(session_id)
            .cloned()
            .ok_or_else(|| PtyError::NotFound(session_id.clone()))
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
