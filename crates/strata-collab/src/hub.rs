//! Room Hub
//!
//! One task per resident room owns the project, its undo/redo history and
//! its sessions. Connections talk to it through a [`RoomHandle`]; requests
//! are handled strictly in arrival order, so every mutation within a room
//! is serialized and every peer sees broadcasts in apply order.

use rand::RngCore;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use strata_core::{AutosaveDecision, AutosavePolicy, History};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::auth::Authenticator;
use crate::config::CollabConfig;
use crate::error::{Error, Result};
use crate::project::{Identity, InviteRole, Members, Project, Role, RoomId};
use crate::protocol::{ClientMessage, DataFrame, PresenceUser, ServerMessage};
use crate::session::{ActiveUser, Outbound, Session, SessionId, SessionRegistry};
use crate::store::Store;

const REQUEST_BUFFER: usize = 1024;

/// Called once with the hub's generation when it stops accepting requests
pub type OnClose = Box<dyn FnOnce(Uuid) + Send>;

/// Result of a successful join
#[derive(Debug, Clone)]
pub struct JoinTicket {
    pub session_id: SessionId,
    pub role: Role,
    pub color: String,
}

/// Point-in-time copy of a room's state
#[derive(Debug, Clone)]
pub struct RoomSnapshot {
    pub project: Project,
    pub undo_len: usize,
    pub redo_len: usize,
    pub users: Vec<ActiveUser>,
}

enum HubRequest {
    Join {
        identity: Identity,
        outbound: Outbound,
        reply: oneshot::Sender<Result<JoinTicket>>,
    },
    Leave {
        session_id: SessionId,
        reply: oneshot::Sender<()>,
    },
    Message {
        session_id: SessionId,
        message: ClientMessage,
    },
    Snapshot {
        reply: oneshot::Sender<RoomSnapshot>,
    },
    Invitation {
        reply: oneshot::Sender<(Members, String)>,
    },
    Admit {
        email: String,
        role: InviteRole,
        reply: oneshot::Sender<bool>,
    },
    Flush {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable handle to a running room hub
#[derive(Clone)]
pub struct RoomHandle {
    room_id: RoomId,
    generation: Uuid,
    tx: mpsc::Sender<HubRequest>,
}

impl std::fmt::Debug for RoomHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomHandle")
            .field("room_id", &self.room_id)
            .field("generation", &self.generation)
            .finish()
    }
}

impl RoomHandle {
    /// Start a hub for a loaded project
    pub fn spawn(
        project: Project,
        store: Arc<dyn Store>,
        authenticator: Arc<dyn Authenticator>,
        config: CollabConfig,
        on_close: OnClose,
    ) -> Self {
        let (tx, rx) = mpsc::channel(REQUEST_BUFFER);
        let handle = Self {
            room_id: project.id.clone(),
            generation: Uuid::new_v4(),
            tx,
        };

        let history = match config.history_limit {
            Some(limit) => History::with_limit(limit),
            None => History::new(),
        };

        let actor = RoomActor {
            generation: handle.generation,
            autosave: AutosavePolicy::new(config.autosave_threshold),
            project,
            revision: 0,
            saved: Arc::new(Mutex::new(0)),
            history,
            sessions: SessionRegistry::new(),
            deadline: None,
            store,
            authenticator,
            config,
            rx,
            on_close: Some(on_close),
        };
        tokio::spawn(actor.run());

        handle
    }

    /// Room id
    #[must_use]
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Identifies this hub instance among successive hubs of the same room
    #[must_use]
    pub fn generation(&self) -> Uuid {
        self.generation
    }

    /// Whether the hub has stopped
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> HubRequest) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(make(reply)).await.map_err(|_| Error::Closed)?;
        rx.await.map_err(|_| Error::Closed)
    }

    /// Add a connection to the room.
    ///
    /// The initial sync frame is queued on `outbound` before this returns.
    pub async fn join(&self, identity: Identity, outbound: Outbound) -> Result<JoinTicket> {
        self.request(|reply| HubRequest::Join {
            identity,
            outbound,
            reply,
        })
        .await?
    }

    /// Remove a connection; resolves after any last-leave save finished
    pub async fn leave(&self, session_id: SessionId) -> Result<()> {
        self.request(|reply| HubRequest::Leave { session_id, reply })
            .await
    }

    /// Queue a decoded client message
    pub async fn submit(&self, session_id: SessionId, message: ClientMessage) -> Result<()> {
        self.tx
            .send(HubRequest::Message {
                session_id,
                message,
            })
            .await
            .map_err(|_| Error::Closed)
    }

    /// Copy of the room state
    pub async fn snapshot(&self) -> Result<RoomSnapshot> {
        self.request(|reply| HubRequest::Snapshot { reply }).await
    }

    /// Current members and invite secret
    pub async fn invitation_state(&self) -> Result<(Members, String)> {
        self.request(|reply| HubRequest::Invitation { reply }).await
    }

    /// Add an invited user to the resident membership lists
    pub async fn admit(&self, email: &str, role: InviteRole) -> Result<bool> {
        let email = email.to_string();
        self.request(|reply| HubRequest::Admit { email, role, reply })
            .await
    }

    /// Write unsaved changes to the store; resolves once written
    pub async fn flush(&self) -> Result<()> {
        self.request(|reply| HubRequest::Flush { reply }).await
    }
}

enum Flow {
    Continue,
    Stop,
}

struct RoomActor {
    generation: Uuid,
    project: Project,
    /// Bumped on every change to `project`; 0 is the state as loaded
    revision: u64,
    /// Highest revision written to the store; held for the whole write
    saved: Arc<Mutex<u64>>,
    history: History,
    sessions: SessionRegistry,
    autosave: AutosavePolicy,
    deadline: Option<Instant>,
    store: Arc<dyn Store>,
    authenticator: Arc<dyn Authenticator>,
    config: CollabConfig,
    rx: mpsc::Receiver<HubRequest>,
    on_close: Option<OnClose>,
}

impl RoomActor {
    async fn run(mut self) {
        info!(room_id = %self.project.id, "room hub started");

        loop {
            let deadline = self.deadline;
            tokio::select! {
                request = self.rx.recv() => {
                    let Some(request) = request else { break };
                    if let Flow::Stop = self.handle(request).await {
                        break;
                    }
                }
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.on_timer();
                }
            }
        }

        self.shutdown();
        info!(room_id = %self.project.id, "room hub stopped");
    }

    async fn handle(&mut self, request: HubRequest) -> Flow {
        match request {
            HubRequest::Join {
                identity,
                outbound,
                reply,
            } => {
                let result = self.join(identity, outbound);
                let _ = reply.send(result);
                if self.sessions.is_empty() {
                    return self.retire().await;
                }
                Flow::Continue
            }

            HubRequest::Leave { session_id, reply } => {
                self.leave(&session_id);
                if self.sessions.is_empty() {
                    self.persist(true).await;
                    self.close();
                    let _ = reply.send(());
                    return Flow::Stop;
                }
                let _ = reply.send(());
                Flow::Continue
            }

            HubRequest::Message {
                session_id,
                message,
            } => {
                let outcome =
                    panic::catch_unwind(AssertUnwindSafe(|| self.dispatch(session_id, message)));
                match outcome {
                    Ok(Ok(())) if self.sessions.is_empty() => self.retire().await,
                    Ok(Ok(())) => Flow::Continue,
                    Ok(Err(e)) => {
                        self.fault(&session_id, &e);
                        Flow::Stop
                    }
                    Err(payload) => {
                        let reason = payload
                            .downcast_ref::<&str>()
                            .map(|s| (*s).to_string())
                            .or_else(|| payload.downcast_ref::<String>().cloned())
                            .unwrap_or_else(|| "panic".to_string());
                        self.fault(&session_id, &Error::internal(reason));
                        Flow::Stop
                    }
                }
            }

            HubRequest::Snapshot { reply } => {
                let _ = reply.send(RoomSnapshot {
                    project: self.project.clone(),
                    undo_len: self.history.undo_len(),
                    redo_len: self.history.redo_len(),
                    users: self.sessions.active_users(),
                });
                Flow::Continue
            }

            HubRequest::Invitation { reply } => {
                let _ = reply.send((
                    self.project.info.members.clone(),
                    self.project.shared.secret.clone(),
                ));
                Flow::Continue
            }

            HubRequest::Admit { email, role, reply } => {
                let _ = reply.send(self.project.info.members.admit(&email, role));
                Flow::Continue
            }

            HubRequest::Flush { reply } => {
                self.persist(false).await;
                let _ = reply.send(());
                Flow::Continue
            }
        }
    }

    fn join(&mut self, identity: Identity, outbound: Outbound) -> Result<JoinTicket> {
        let Some(role) = self.project.info.role_of(&identity.email) else {
            info!(room_id = %self.project.id, user = %identity.email, "access denied");
            return Err(Error::permission_denied("Access denied"));
        };

        let session = Session::new(identity, role, outbound);
        let ticket = JoinTicket {
            session_id: session.id,
            role,
            color: session.color.clone(),
        };
        let joined = ServerMessage::UserConnected {
            id: session.id,
            mail: session.identity.email.clone(),
            color: session.color.clone(),
        };
        info!(
            room_id = %self.project.id,
            session_id = %session.id,
            user = %session.identity.email,
            role = ?role,
            "user connected"
        );
        self.sessions.insert(session);

        let data = ServerMessage::Data(Box::new(self.data_frame()));
        self.send_to(&ticket.session_id, &data);
        self.broadcast_except(Some(&ticket.session_id), &joined);

        Ok(ticket)
    }

    fn leave(&mut self, session_id: &SessionId) {
        if let Some(session) = self.sessions.remove(session_id) {
            info!(
                room_id = %self.project.id,
                session_id = %session_id,
                user = %session.identity.email,
                "user disconnected"
            );
            self.broadcast(&ServerMessage::UserDisconnected { id: *session_id });
        }
    }

    fn data_frame(&self) -> DataFrame {
        let doc = &self.project.document;
        DataFrame {
            project_info: self.project.info.clone(),
            rows: doc.rows.clone(),
            config: doc.config.clone(),
            fossils: doc.fossils.clone(),
            samples: doc.samples.clone(),
            facies: doc.facies.clone(),
            users: self.sessions.roster(),
            user_editing: self.sessions.editing(),
        }
    }

    fn dispatch(&mut self, session_id: SessionId, message: ClientMessage) -> Result<()> {
        let Some(session) = self.sessions.get(&session_id) else {
            debug!(session_id = %session_id, "message from departed session");
            return Ok(());
        };
        let role = session.role;

        if !role.can_edit() {
            debug!(
                room_id = %self.project.id,
                session_id = %session_id,
                action = message.action(),
                "rejected message from reader"
            );
            self.reject(
                &session_id,
                "Don't have permission to edit this document",
            );
            return Ok(());
        }

        match message {
            ClientMessage::EditingUser { section } => {
                let Some(session) = self.sessions.get_mut(&session_id) else {
                    return Ok(());
                };
                session.editing = Some(section.clone());
                let msg = ServerMessage::EditingUser {
                    value: section,
                    data: PresenceUser {
                        id: session.id,
                        name: session.identity.email.clone(),
                        color: session.color.clone(),
                    },
                };
                self.broadcast(&msg);
            }

            ClientMessage::DeleteEditingUser { section } => {
                let Some(session) = self.sessions.get_mut(&session_id) else {
                    return Ok(());
                };
                session.editing = None;
                let msg = ServerMessage::DeleteEditingUser {
                    value: section,
                    user_name: session.identity.email.clone(),
                };
                self.broadcast(&msg);
            }

            ClientMessage::Undo => {
                if let Some(command) = self.history.undo(&mut self.project.document)? {
                    let msg = ServerMessage::for_command(&command, &self.project.document);
                    self.broadcast(&msg);
                    self.count_action();
                }
            }

            ClientMessage::Redo => {
                if let Some(command) = self.history.redo(&mut self.project.document)? {
                    let msg = ServerMessage::for_command(&command, &self.project.document);
                    self.broadcast(&msg);
                    self.count_action();
                }
            }

            ClientMessage::Save => {
                let ack = self.sessions.get(&session_id).map(Session::outbound);
                self.spawn_save(ack);
            }

            ClientMessage::GenerateTokenLink => {
                if !role.is_owner() {
                    self.reject(&session_id, "Only the owner can share this document");
                    return Ok(());
                }
                self.generate_token_link(&session_id);
            }

            ClientMessage::RevokeTokenLink => {
                if !role.is_owner() {
                    self.reject(&session_id, "Only the owner can share this document");
                    return Ok(());
                }
                if self.project.shared.is_active() {
                    self.project.shared.secret.clear();
                    info!(room_id = %self.project.id, "invite link revoked");
                    self.count_action();
                }
            }

            ClientMessage::Edit(edit) => {
                let Some(action) = self.project.document.prepare(edit) else {
                    debug!(room_id = %self.project.id, "edit ignored");
                    return Ok(());
                };
                let forward = action.forward.clone();
                self.history.record(&mut self.project.document, action)?;
                let msg = ServerMessage::for_command(&forward, &self.project.document);
                self.broadcast(&msg);
                self.count_action();
            }
        }

        Ok(())
    }

    fn generate_token_link(&mut self, session_id: &SessionId) {
        if !self.project.shared.is_active() {
            let mut bytes = [0u8; 8];
            rand::thread_rng().fill_bytes(&mut bytes);
            self.project.shared.secret = hex::encode(bytes);
            info!(room_id = %self.project.id, "invite link created");
            self.count_action();
        }

        let secret = &self.project.shared.secret;
        let tokens = self
            .authenticator
            .issue_invite(&self.project.id, InviteRole::Editors, secret)
            .and_then(|editor| {
                self.authenticator
                    .issue_invite(&self.project.id, InviteRole::Readers, secret)
                    .map(|reader| (editor, reader))
            });

        match tokens {
            Ok((editor, reader)) => {
                self.send_to(session_id, &ServerMessage::TokenLink { editor, reader });
            }
            Err(e) => {
                warn!(room_id = %self.project.id, error = %e, "failed to issue invite tokens");
                self.send_to(session_id, &ServerMessage::error(e.code(), e.to_string()));
            }
        }
    }

    fn reject(&mut self, session_id: &SessionId, message: &str) {
        let err = Error::permission_denied(message);
        self.send_to(session_id, &ServerMessage::from_error(&err));
    }

    fn count_action(&mut self) {
        self.revision += 1;
        match self.autosave.record() {
            AutosaveDecision::StartTimer | AutosaveDecision::ResetTimer => {
                self.deadline = Some(Instant::now() + self.config.autosave_interval);
            }
            AutosaveDecision::SaveNow => {
                debug!(room_id = %self.project.id, "autosave threshold reached");
                self.spawn_save(None);
            }
        }
    }

    fn on_timer(&mut self) {
        self.deadline = None;
        if self.autosave.expire() {
            debug!(room_id = %self.project.id, "autosave timer fired");
            self.spawn_save(None);
        }
    }

    /// Save a copy of the project without blocking the hub.
    ///
    /// Writes are serialized through `saved`; a copy older than what the
    /// store already holds is skipped.
    fn spawn_save(&self, ack: Option<Outbound>) {
        let project = self.project.clone();
        let revision = self.revision;
        let saved = Arc::clone(&self.saved);
        let store = self.store.clone();

        tokio::spawn(async move {
            let mut saved = saved.lock().await;
            let reply = if *saved > revision {
                debug!(room_id = %project.id, revision, "newer revision already saved");
                ServerMessage::Saved
            } else {
                match store.save(&project).await {
                    Ok(()) => {
                        *saved = revision;
                        info!(room_id = %project.id, revision, "project saved");
                        ServerMessage::Saved
                    }
                    Err(e) => {
                        warn!(room_id = %project.id, error = %e, "failed to save project");
                        ServerMessage::from_error(&Error::from(e))
                    }
                }
            };
            drop(saved);

            if let Some(tx) = ack {
                if let Ok(frame) = reply.encode() {
                    let _ = tx.try_send(frame);
                }
            }
        });
    }

    /// Save inline once in-flight saves have finished.
    ///
    /// Unless `always` is set, nothing is written when the store already
    /// holds the current revision.
    async fn persist(&mut self, always: bool) {
        let saved = Arc::clone(&self.saved);
        let mut saved = saved.lock().await;
        if !always && *saved >= self.revision {
            return;
        }
        match self.store.save(&self.project).await {
            Ok(()) => {
                *saved = self.revision;
                info!(
                    room_id = %self.project.id,
                    revision = self.revision,
                    "project saved on close"
                );
            }
            Err(e) => warn!(room_id = %self.project.id, error = %e, "failed to save project"),
        }
    }

    /// Close a room nobody is connected to anymore, keeping unsaved work
    async fn retire(&mut self) -> Flow {
        debug!(room_id = %self.project.id, "no sessions left");
        self.persist(false).await;
        self.close();
        Flow::Stop
    }

    /// Tear the room down after an internal fault
    fn fault(&mut self, offender: &SessionId, err: &Error) {
        error!(
            room_id = %self.project.id,
            session_id = %offender,
            error = %err,
            "internal fault, closing room"
        );

        self.send_to(offender, &ServerMessage::error(err.code(), "Internal server error"));

        if let Ok(frame) = ServerMessage::closed().encode() {
            self.sessions.broadcast(&frame);
        }
        self.sessions.drain();
        self.close();
    }

    /// Leave the registry and stop accepting requests
    fn close(&mut self) {
        if let Some(on_close) = self.on_close.take() {
            on_close(self.generation);
        }
        self.rx.close();
    }

    fn shutdown(&mut self) {
        self.close();
        while let Ok(request) = self.rx.try_recv() {
            match request {
                HubRequest::Join { reply, .. } => {
                    let _ = reply.send(Err(Error::Closed));
                }
                HubRequest::Leave { reply, .. } | HubRequest::Flush { reply } => {
                    let _ = reply.send(());
                }
                _ => {}
            }
        }
        // Remaining sessions lose their outbound queue here
        self.sessions.drain();
    }

    fn send_to(&mut self, session_id: &SessionId, msg: &ServerMessage) {
        let frame = match msg.encode() {
            Ok(frame) => frame,
            Err(e) => {
                error!(error = %e, "failed to encode frame");
                return;
            }
        };
        if !self.sessions.send_to(session_id, &frame) {
            self.drop_sessions(vec![*session_id]);
        }
    }

    fn broadcast(&mut self, msg: &ServerMessage) {
        self.broadcast_except(None, msg);
    }

    fn broadcast_except(&mut self, except: Option<&SessionId>, msg: &ServerMessage) {
        let frame = match msg.encode() {
            Ok(frame) => frame,
            Err(e) => {
                error!(error = %e, "failed to encode frame");
                return;
            }
        };
        let stalled = self.sessions.broadcast_except(except, &frame);
        self.drop_sessions(stalled);
    }

    /// Drop peers whose queue is full or gone and tell the rest
    fn drop_sessions(&mut self, mut stalled: Vec<SessionId>) {
        while let Some(id) = stalled.pop() {
            if self.sessions.remove(&id).is_none() {
                continue;
            }
            warn!(room_id = %self.project.id, session_id = %id, "dropping unresponsive peer");
            if let Ok(frame) = (ServerMessage::UserDisconnected { id }).encode() {
                stalled.extend(self.sessions.broadcast(&frame));
            }
        }
    }
}
