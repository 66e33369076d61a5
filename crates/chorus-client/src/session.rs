//! Session state machine.
//!
//! One `Session` per process: the composition root constructs it once and
//! hands it to consumers by reference. It owns all live state (identity,
//! room, chat, queue, conversations, clock estimate) and is the only thing
//! that mutates any of it.
//!
//! Operations return `Result<Vec<Action>, NotReady>`: either the ordered side
//! effects for the driver, or the precondition that was missing. Inbound
//! events go through [`Session::handle`], which never fails: events arriving
//! at the wrong moment (stale broadcasts after a leave, replies after
//! teardown) are logged and dropped so one handler's misfortune cannot stall
//! the stream.

use chorus_core::{Clock, ClockEstimate, ClockSync, seek_position};
use chorus_proto::{
    ChatEventEnvelope, ChatMessage, Command, ConversationRequest, DirectMessage, DmModifyAction,
    DmModifyRequest, EmojiReaction, PlaybackSignal, QueueEntry, QueueRequest, QueueSnapshot,
    RoomInfo, ServerEvent, SongEvent, TimeSyncRequest, UserProfile, UserRef, VoteRecord,
};

use crate::{
    action::Action,
    config::SessionConfig,
    dm::DmSession,
    error::NotReady,
    external::DirectoryError,
    queue::QueueReconciler,
    room::RoomSession,
    state::{ChatState, DmState, HistoryState, SessionPhase},
    subscription::{SubscriberId, Subscription},
};

/// The live room synchronization client.
///
/// Generic over [`Clock`] so tests drive time deterministically.
pub struct Session<C: Clock> {
    clock: C,
    config: SessionConfig,
    phase: SessionPhase,
    identity: Option<UserProfile>,
    clock_sync: ClockSync,
    room: RoomSession,
    queue: QueueReconciler,
    dm: DmSession,
}

impl<C: Clock> Session<C> {
    /// Create a disconnected session.
    pub fn new(clock: C, config: SessionConfig) -> Self {
        let clock_sync = ClockSync::new(config.probe_timeout);
        Self {
            clock,
            config,
            phase: SessionPhase::Disconnected,
            identity: None,
            clock_sync,
            room: RoomSession::default(),
            queue: QueueReconciler::default(),
            dm: DmSession::default(),
        }
    }

    // ── Connection lifecycle ────────────────────────────────────────────

    /// Begin initialization: fetch our identity, then open the channel.
    ///
    /// Idempotent under re-entrant calls from multiple UI mount points: a
    /// second call while an attempt is in flight gets
    /// [`NotReady::AlreadyConnecting`], a call after success gets
    /// [`NotReady::AlreadyConnected`].
    pub fn initialize(&mut self) -> Result<Vec<Action>, NotReady> {
        match self.phase {
            SessionPhase::Disconnected => {},
            SessionPhase::Connecting => return Err(NotReady::AlreadyConnecting),
            _ => return Err(NotReady::AlreadyConnected),
        }

        self.phase = SessionPhase::Connecting;
        Ok(vec![Action::FetchSelf])
    }

    /// Complete the identity lookup started by [`Action::FetchSelf`].
    ///
    /// Identity is a hard prerequisite for everything else, so a failed
    /// lookup aborts the whole initialization.
    pub fn identity_fetched(
        &mut self,
        result: Result<UserProfile, DirectoryError>,
    ) -> Vec<Action> {
        if self.phase != SessionPhase::Connecting {
            tracing::debug!("identity result arrived outside initialization; dropped");
            return vec![];
        }

        match result {
            Ok(profile) => {
                tracing::info!(user_id = %profile.user_id, "identity cached");
                self.identity = Some(profile);
                vec![Action::OpenChannel]
            },
            Err(e) => {
                tracing::warn!(error = %e, "identity lookup failed; initialization aborted");
                self.phase = SessionPhase::Disconnected;
                vec![Action::Notify { message: "Failed to fetch user info".into() }]
            },
        }
    }

    /// The transport is open: send the identity handshake and take a first
    /// clock sample.
    pub fn channel_opened(&mut self) -> Vec<Action> {
        let Some(user) = self.identity.clone() else {
            tracing::debug!("channel opened without identity; dropped");
            return vec![];
        };

        let mut actions =
            vec![Action::Emit(Command::ConnectUser(UserRef { user_id: user.user_id }))];
        actions.extend(self.poll_clock());
        actions
    }

    /// Tear down unconditionally: channel, identity, room, queue,
    /// conversations, subscribers, guards. Safe to call repeatedly, in any
    /// phase.
    pub fn disconnect(&mut self) -> Vec<Action> {
        let had_channel = self.phase != SessionPhase::Disconnected;

        self.phase = SessionPhase::Disconnected;
        self.identity = None;
        self.room.clear();
        self.queue.clear();
        self.dm.clear();
        self.clock_sync = ClockSync::new(self.config.probe_timeout);

        if had_channel { vec![Action::CloseChannel] } else { vec![] }
    }

    // ── Room session ────────────────────────────────────────────────────

    /// Join a room: fetch its metadata, then emit the join handshake and
    /// request chat history.
    ///
    /// Re-entrant joins of the same room are allowed while the first is in
    /// flight; the history guard ensures only one history request goes out.
    pub fn join_room(&mut self, room_id: impl Into<String>) -> Result<Vec<Action>, NotReady> {
        let room_id = room_id.into();
        if self.identity.is_none() {
            return Err(NotReady::MissingIdentity);
        }

        // Switching rooms drops the previous room's chat and guards.
        if self.room.current().is_some_and(|room| room.room_id != room_id) {
            self.room.leave();
        }

        self.phase = SessionPhase::Joining;

        let mut actions = self.poll_clock();
        actions.push(Action::FetchRoom { room_id });
        Ok(actions)
    }

    /// Complete the room lookup started by [`Action::FetchRoom`].
    pub fn room_fetched(&mut self, result: Result<RoomInfo, DirectoryError>) -> Vec<Action> {
        if self.phase != SessionPhase::Joining {
            tracing::debug!("room result arrived outside a join; dropped");
            return vec![];
        }

        let Some(user) = self.identity.clone() else {
            tracing::debug!("room result arrived without identity; dropped");
            return vec![];
        };

        match result {
            Ok(room) => {
                let room_id = room.room_id.clone();
                self.room.set_current(room);

                let mut actions =
                    vec![Action::Emit(Command::JoinRoom(self.chat_envelope(&user, &room_id)))];
                actions.extend(self.request_chat_history());
                actions
            },
            Err(e) => {
                tracing::warn!(error = %e, "room lookup failed; join aborted");
                self.phase = SessionPhase::Connected;
                vec![Action::Notify { message: "Failed to fetch room data".into() }]
            },
        }
    }

    /// Leave the current room. Requires the Joined phase.
    ///
    /// Clears chat, the history guard and the cached room reference, so a
    /// later join of the same room issues a fresh history request even if an
    /// unanswered one left the old guard set.
    pub fn leave_room(&mut self) -> Result<Vec<Action>, NotReady> {
        if self.phase != SessionPhase::Joined {
            return Err(NotReady::NotJoined);
        }
        let user = self.identity.clone().ok_or(NotReady::MissingIdentity)?;
        let room_id =
            self.room.current().map(|r| r.room_id.clone()).ok_or(NotReady::NoActiveRoom)?;

        let mut actions = self.poll_clock();
        actions.push(Action::Emit(Command::LeaveRoom(self.chat_envelope(&user, &room_id))));

        self.room.leave();
        self.queue.clear();
        self.phase = SessionPhase::Connected;
        Ok(actions)
    }

    /// Send one live chat message.
    ///
    /// Sets the sending flag; the echo of our own message clears it.
    pub fn send_live_chat_message(&mut self, text: &str) -> Result<Vec<Action>, NotReady> {
        let user = self.identity.clone().ok_or(NotReady::MissingIdentity)?;
        let room_id =
            self.room.current().map(|r| r.room_id.clone()).ok_or(NotReady::NoActiveRoom)?;
        if text.trim().is_empty() {
            return Err(NotReady::BlankMessage);
        }

        let mut actions = self.poll_clock();
        let envelope = ChatEventEnvelope {
            user_id: user.user_id.clone(),
            body: Some(ChatMessage {
                message_body: text.to_string(),
                sender: user,
                room_id,
                date_created: self.now(),
            }),
            error_message: None,
        };
        actions.push(Action::Emit(Command::LiveMessage(envelope)));
        self.room.mark_sending();
        Ok(actions)
    }

    /// Broadcast a transient emoji reaction (best-effort delivery).
    pub fn send_reaction(&mut self, emoji: &str) -> Result<Vec<Action>, NotReady> {
        let user = self.identity.as_ref().ok_or(NotReady::MissingIdentity)?;

        let reaction = EmojiReaction {
            date_created: self.clock.now_utc_ms(),
            body: emoji.to_string(),
            user_id: user.user_id.clone(),
        };
        Ok(vec![Action::Emit(Command::EmojiReaction(reaction))])
    }

    /// Ask the server to start room playback.
    pub fn start_playback(&mut self) -> Result<Vec<Action>, NotReady> {
        self.playback_signal(Command::InitPlay)
    }

    /// Ask the server to pause room playback.
    pub fn pause_playback(&mut self) -> Result<Vec<Action>, NotReady> {
        self.playback_signal(Command::InitPause)
    }

    /// Ask the server to stop room playback.
    pub fn stop_playback(&mut self) -> Result<Vec<Action>, NotReady> {
        self.playback_signal(Command::InitStop)
    }

    /// Whether the local user controls the current room (creator only).
    pub fn can_control(&self) -> bool {
        match (&self.identity, self.room.current()) {
            (Some(user), Some(room)) => room.creator.user_id == user.user_id,
            _ => false,
        }
    }

    /// Register a chat subscriber; it immediately receives the cached state.
    pub fn subscribe_chat(&mut self, id: impl Into<SubscriberId>) -> Subscription<ChatState> {
        self.room.subscribe(id.into())
    }

    /// Register a subscriber for transient emoji reactions.
    pub fn subscribe_reactions(
        &mut self,
        id: impl Into<SubscriberId>,
    ) -> Subscription<EmojiReaction> {
        self.room.subscribe_reactions(id.into())
    }

    // ── Queue ───────────────────────────────────────────────────────────

    /// Register a queue subscriber and request a fresh snapshot.
    ///
    /// Re-registering the same id replaces the previous channel, and several
    /// UI regions share one `requestQueue` round trip instead of issuing
    /// their own.
    pub fn fetch_queue(
        &mut self,
        id: impl Into<SubscriberId>,
    ) -> Result<(Subscription<Vec<QueueEntry>>, Vec<Action>), NotReady> {
        self.identity.as_ref().ok_or(NotReady::MissingIdentity)?;
        let room_id =
            self.room.current().map(|r| r.room_id.clone()).ok_or(NotReady::NoActiveRoom)?;

        let subscription = self.queue.subscribe(id.into());
        let request = QueueRequest { room_id, created_at: self.now() };
        Ok((subscription, vec![Action::Emit(Command::RequestQueue(request))]))
    }

    /// Add a song to the shared queue, then immediately re-request a
    /// snapshot: the queue re-synchronizes from the server rather than
    /// trusting an optimistic local update.
    pub fn enqueue_song(&mut self, song: QueueEntry) -> Result<Vec<Action>, NotReady> {
        let (event, request) = self.queue_mutation(song)?;
        Ok(vec![
            Action::Emit(Command::EnqueueSong(event)),
            Action::Emit(Command::RequestQueue(request)),
        ])
    }

    /// Remove a song from the shared queue, then re-request a snapshot.
    pub fn dequeue_song(&mut self, song: QueueEntry) -> Result<Vec<Action>, NotReady> {
        let (event, request) = self.queue_mutation(song)?;
        Ok(vec![
            Action::Emit(Command::DequeueSong(event)),
            Action::Emit(Command::RequestQueue(request)),
        ])
    }

    /// Upvote a queued song. State changes only via the server's
    /// `voteUpdated` delta.
    pub fn upvote_song(&mut self, song: QueueEntry) -> Result<Vec<Action>, NotReady> {
        let (event, _) = self.queue_mutation(song)?;
        Ok(vec![Action::Emit(Command::UpvoteSong(event))])
    }

    /// Downvote a queued song.
    pub fn downvote_song(&mut self, song: QueueEntry) -> Result<Vec<Action>, NotReady> {
        let (event, _) = self.queue_mutation(song)?;
        Ok(vec![Action::Emit(Command::DownvoteSong(event))])
    }

    /// Flip an existing vote on a queued song.
    pub fn swap_song_vote(&mut self, song: QueueEntry) -> Result<Vec<Action>, NotReady> {
        let (event, _) = self.queue_mutation(song)?;
        Ok(vec![Action::Emit(Command::SwapSongVote(event))])
    }

    /// Retract an existing vote on a queued song.
    pub fn undo_song_vote(&mut self, song: QueueEntry) -> Result<Vec<Action>, NotReady> {
        let (event, _) = self.queue_mutation(song)?;
        Ok(vec![Action::Emit(Command::UndoSongVote(event))])
    }

    // ── Direct messages ─────────────────────────────────────────────────

    /// Open a conversation with `counterpart`, registering the subscriber.
    pub fn enter_dm(
        &mut self,
        counterpart: UserProfile,
        id: impl Into<SubscriberId>,
    ) -> Result<(Subscription<DmState>, Vec<Action>), NotReady> {
        let user = self.identity.clone().ok_or(NotReady::MissingIdentity)?;

        let mut actions = self.poll_clock();
        actions.push(Action::Emit(Command::EnterDirectMessage(ConversationRequest {
            user_id: user.user_id,
            participant_id: counterpart.user_id.clone(),
        })));

        let subscription = self.dm.enter(counterpart, id.into());
        Ok((subscription, actions))
    }

    /// Request conversation history.
    ///
    /// Idempotent: an outstanding request, already-received history, or a
    /// missing identity/conversation/subscriber each refuse with their own
    /// [`NotReady`] reason.
    pub fn request_dm_history(&mut self) -> Result<Vec<Action>, NotReady> {
        if self.dm.history().is_requested() {
            return Err(NotReady::HistoryRequested);
        }
        let user = self.identity.as_ref().ok_or(NotReady::MissingIdentity)?;
        let counterpart = self.dm.counterpart().ok_or(NotReady::NoConversation)?;
        if !self.dm.has_subscriber() {
            return Err(NotReady::NoSubscriber);
        }
        if self.dm.history().is_received() {
            return Err(NotReady::HistoryReceived);
        }

        let request = ConversationRequest {
            user_id: user.user_id.clone(),
            participant_id: counterpart.user_id.clone(),
        };
        self.dm.mark_history_requested(self.clock.now_utc_ms());
        Ok(vec![Action::Emit(Command::GetDirectMessageHistory(request))])
    }

    /// Send a direct message to the active counterpart.
    pub fn send_dm(&mut self, text: &str) -> Result<Vec<Action>, NotReady> {
        let user = self.identity.clone().ok_or(NotReady::MissingIdentity)?;
        let counterpart = self.dm.counterpart().cloned().ok_or(NotReady::NoConversation)?;
        if !self.dm.has_subscriber() {
            return Err(NotReady::NoSubscriber);
        }
        if text.trim().is_empty() {
            return Err(NotReady::BlankMessage);
        }

        let mut actions = self.poll_clock();
        let message = DirectMessage {
            index: 0, // server assigns the real index
            message_body: text.to_string(),
            sender: user,
            recipient: counterpart,
            date_sent: self.now(),
            date_read: 0,
            is_read: false,
            persistent_id: String::new(),
            body_is_room_id: false,
        };
        actions.push(Action::Emit(Command::DirectMessage(message)));
        Ok(actions)
    }

    /// Edit a sent direct message.
    pub fn edit_dm(
        &mut self,
        mut message: DirectMessage,
        new_body: &str,
    ) -> Result<Vec<Action>, NotReady> {
        if new_body.trim().is_empty() {
            return Err(NotReady::BlankMessage);
        }
        message.message_body = new_body.to_string();
        self.modify_dm(message, DmModifyAction::Edit)
    }

    /// Delete a sent direct message.
    pub fn delete_dm(&mut self, message: DirectMessage) -> Result<Vec<Action>, NotReady> {
        self.modify_dm(message, DmModifyAction::Delete)
    }

    /// Close the active conversation. Always safe, including when none is
    /// active.
    pub fn leave_dm(&mut self) -> Vec<Action> {
        let Some(user) = self.identity.clone() else {
            self.dm.leave();
            return vec![];
        };

        let mut actions = self.poll_clock();
        actions.push(Action::Emit(Command::ExitDirectMessage(UserRef { user_id: user.user_id })));
        self.dm.leave();
        actions
    }

    // ── Inbound events ──────────────────────────────────────────────────

    /// Process one inbound event.
    ///
    /// Never fails: events that cannot apply are logged and dropped, and one
    /// handler's trouble never blocks the events behind it.
    pub fn handle(&mut self, event: ServerEvent) -> Vec<Action> {
        match event {
            ServerEvent::Connected(_) => self.handle_connected(),
            ServerEvent::UserJoinedRoom(envelope) => self.handle_user_joined(&envelope),
            ServerEvent::UserLeftRoom(envelope) => {
                tracing::debug!(user_id = %envelope.user_id, "user left room");
                vec![]
            },
            ServerEvent::LiveChatHistory(history) => self.handle_chat_history(history),
            ServerEvent::LiveMessage(envelope) => self.handle_live_message(envelope),
            ServerEvent::ServerError(envelope) => {
                let reason = envelope.error_message.as_deref().unwrap_or("unspecified");
                tracing::warn!(%reason, "server reported an error");
                vec![]
            },
            ServerEvent::PlayMedia(signal) => self.handle_play_media(&signal),
            ServerEvent::PauseMedia(_) => self.handle_halt_media("pauseMedia"),
            ServerEvent::StopMedia(_) => self.handle_halt_media("stopMedia"),
            ServerEvent::TimeSyncResponse(reply) => {
                let now = self.now();
                self.clock_sync.complete_offset_exchange(reply.t0, reply.t1, reply.t2, now);
                vec![]
            },
            ServerEvent::Pong => {
                let now = self.now();
                self.clock_sync.complete_probe(now);
                vec![]
            },
            ServerEvent::DirectMessage(message) => self.handle_direct_message(message),
            ServerEvent::DmHistory(history) => self.handle_dm_history(history),
            ServerEvent::UserOnline(user) => self.handle_user_online(&user),
            ServerEvent::UserOffline(user) => {
                tracing::debug!(user_id = %user.user_id, "user went offline");
                vec![]
            },
            ServerEvent::ChatModified(_) => {
                // Reserved event; the server does not send it yet.
                tracing::debug!("chatModified received; not handled");
                vec![]
            },
            ServerEvent::EmojiReaction(reaction) => self.handle_emoji_reaction(reaction),
            ServerEvent::QueueState(snapshot) => self.handle_queue_state(snapshot),
            ServerEvent::SongAdded(event) => self.handle_song_added(event),
            ServerEvent::SongRemoved(event) => self.handle_song_removed(&event),
            ServerEvent::VoteUpdated(event) => self.handle_vote_updated(event),
        }
    }

    /// Housekeeping: release guards whose replies never came.
    pub fn tick(&mut self) -> Vec<Action> {
        let now = self.now();
        self.clock_sync.tick(now);

        let timeout_ms = self.config.history_timeout.as_millis() as i64;
        if self.room.release_stale_history(now, timeout_ms) {
            tracing::debug!("chat history request timed out; guard released for retry");
        }
        if self.dm.release_stale_history(now, timeout_ms) {
            tracing::debug!("DM history request timed out; guard released for retry");
        }

        vec![]
    }

    // ── Accessors ───────────────────────────────────────────────────────

    /// Current lifecycle phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// The configuration the session was built with.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The cached identity, once fetched.
    pub fn identity(&self) -> Option<&UserProfile> {
        self.identity.as_ref()
    }

    /// The cached room reference, while joined or joining.
    pub fn current_room(&self) -> Option<&RoomInfo> {
        self.room.current()
    }

    /// Chat messages for the current room, in arrival order.
    pub fn chat_messages(&self) -> &[ChatMessage] {
        self.room.messages()
    }

    /// Chat snapshot as subscribers see it.
    pub fn chat_state(&self) -> ChatState {
        self.room.state()
    }

    /// Live-chat history guard state.
    pub fn chat_history_state(&self) -> HistoryState {
        self.room.history()
    }

    /// Local queue mirror, sorted ascending by ordinal index.
    pub fn queue_entries(&self) -> &[QueueEntry] {
        self.queue.entries()
    }

    /// Vote set as of the last queue snapshot.
    pub fn queue_votes(&self) -> &[VoteRecord] {
        self.queue.votes()
    }

    /// Conversation snapshot as subscribers see it.
    pub fn dm_state(&self) -> DmState {
        self.dm.state()
    }

    /// DM history guard state.
    pub fn dm_history_state(&self) -> HistoryState {
        self.dm.history()
    }

    /// Latest latency/offset estimate.
    pub fn clock_estimate(&self) -> ClockEstimate {
        self.clock_sync.estimate()
    }

    // ── Internals ───────────────────────────────────────────────────────

    fn now(&self) -> i64 {
        self.clock.now_utc_ms()
    }

    /// Opportunistic clock refresh before time-sensitive operations.
    ///
    /// Lazy rather than periodic: called on joins, sends, and seek
    /// computations, never on a timer. A probe already in flight just skips
    /// the ping; the offset exchange always goes out.
    fn poll_clock(&mut self) -> Vec<Action> {
        let now = self.now();
        let mut actions = Vec::new();

        if self.clock_sync.begin_probe(now).is_ok() {
            actions.push(Action::Emit(Command::Ping));
        }

        let t0 = self.clock_sync.begin_offset_exchange(now);
        actions.push(Action::Emit(Command::TimeSync(TimeSyncRequest { t0 })));
        actions
    }

    /// Join/leave/history envelope: identity plus an empty placeholder
    /// message for the room.
    fn chat_envelope(&self, user: &UserProfile, room_id: &str) -> ChatEventEnvelope {
        ChatEventEnvelope {
            user_id: user.user_id.clone(),
            body: Some(ChatMessage {
                message_body: String::new(),
                sender: user.clone(),
                room_id: room_id.to_string(),
                date_created: self.now(),
            }),
            error_message: None,
        }
    }

    /// Emit a chat history request unless one is outstanding or history
    /// already arrived. Requires identity and a cached room.
    fn request_chat_history(&mut self) -> Vec<Action> {
        if self.room.history().is_requested() || self.room.history().is_received() {
            return vec![];
        }
        let Some(user) = self.identity.clone() else {
            return vec![];
        };
        let Some(room_id) = self.room.current().map(|r| r.room_id.clone()) else {
            return vec![];
        };

        self.room.mark_history_requested(self.now());
        vec![Action::Emit(Command::GetLiveChatHistory(self.chat_envelope(&user, &room_id)))]
    }

    /// Common precondition check + payload assembly for queue operations.
    fn queue_mutation(
        &mut self,
        song: QueueEntry,
    ) -> Result<(SongEvent, QueueRequest), NotReady> {
        self.identity.as_ref().ok_or(NotReady::MissingIdentity)?;
        let room_id =
            self.room.current().map(|r| r.room_id.clone()).ok_or(NotReady::NoActiveRoom)?;

        let now = self.now();
        let event = SongEvent { song, room_id: room_id.clone(), created_at: now };
        let request = QueueRequest { room_id, created_at: now };
        Ok((event, request))
    }

    /// Common precondition check for `initPlay`/`initPause`/`initStop`.
    fn playback_signal(
        &mut self,
        command: fn(PlaybackSignal) -> Command,
    ) -> Result<Vec<Action>, NotReady> {
        let user = self.identity.clone().ok_or(NotReady::MissingIdentity)?;
        let room_id =
            self.room.current().map(|r| r.room_id.clone()).ok_or(NotReady::NoActiveRoom)?;

        let mut actions = self.poll_clock();
        actions.push(Action::Emit(command(PlaybackSignal {
            user_id: user.user_id,
            room_id,
            spotify_id: None,
            utc_start: None,
        })));
        Ok(actions)
    }

    fn modify_dm(
        &mut self,
        message: DirectMessage,
        action: DmModifyAction,
    ) -> Result<Vec<Action>, NotReady> {
        let user = self.identity.clone().ok_or(NotReady::MissingIdentity)?;
        let counterpart = self.dm.counterpart().cloned().ok_or(NotReady::NoConversation)?;
        if !self.dm.has_subscriber() {
            return Err(NotReady::NoSubscriber);
        }

        let mut actions = self.poll_clock();
        actions.push(Action::Emit(Command::ModifyDirectMessage(DmModifyRequest {
            user_id: user.user_id,
            participant_id: counterpart.user_id,
            action,
            message,
        })));
        Ok(actions)
    }

    fn handle_connected(&mut self) -> Vec<Action> {
        if self.identity.is_none() {
            tracing::debug!("connected event before identity; dropped");
            return vec![];
        }

        if self.phase == SessionPhase::Connecting {
            self.phase = SessionPhase::Connected;
        }

        // Handshake after a reconnect: a room reference still cached means
        // the server no longer knows our membership. Re-run the join flow.
        if let Some(room_id) = self.room.current().map(|r| r.room_id.clone()) {
            tracing::info!(%room_id, "re-joining room after reconnect");
            self.phase = SessionPhase::Joining;
            let mut actions = self.poll_clock();
            actions.push(Action::FetchRoom { room_id });
            return actions;
        }

        vec![]
    }

    fn handle_user_joined(&mut self, envelope: &ChatEventEnvelope) -> Vec<Action> {
        let Some(me) = self.identity.as_ref() else {
            tracing::debug!("userJoinedRoom before identity; dropped");
            return vec![];
        };

        let joined_id = envelope
            .body
            .as_ref()
            .map_or(envelope.user_id.as_str(), |m| m.sender.user_id.as_str());

        if joined_id == me.user_id {
            self.phase = SessionPhase::Joined;
            self.room.mark_joined();
        }

        // Even someone else's join means chat is live; make sure history is
        // on its way (covers the handshake race where we learn of our own
        // membership through another path).
        self.request_chat_history()
    }

    fn handle_chat_history(&mut self, history: Vec<ChatMessage>) -> Vec<Action> {
        if self.identity.is_none() || self.room.current().is_none() {
            tracing::debug!("chat history without identity or room; dropped");
            return vec![];
        }

        self.room.apply_history(history);
        vec![]
    }

    fn handle_live_message(&mut self, envelope: ChatEventEnvelope) -> Vec<Action> {
        if self.identity.is_none() {
            tracing::debug!("liveMessage before identity; dropped");
            return vec![];
        }
        let Some(message) = envelope.body else {
            tracing::debug!("liveMessage without body; dropped");
            return vec![];
        };
        if self.room.current().is_none() {
            tracing::debug!("liveMessage without a room; dropped");
            return vec![];
        }

        // Messages and history race on the transport; a message beating the
        // history snapshot means we should (re)request it.
        let actions = if self.room.history().is_received() {
            vec![]
        } else {
            self.request_chat_history()
        };

        let is_own_echo = message.sender.user_id == self.identity_id();
        self.room.apply_message(message, is_own_echo);
        actions
    }

    fn handle_play_media(&mut self, signal: &PlaybackSignal) -> Vec<Action> {
        // Stale broadcasts after leaving are a defensive no-op, not an error.
        if self.identity.is_none() {
            tracing::debug!("playMedia without identity; ignored");
            return vec![];
        }
        if self.room.current().is_none() {
            tracing::debug!("playMedia without a room; ignored");
            return vec![];
        }
        let Some(start_utc) = signal.utc_start else {
            tracing::warn!("playMedia without UTC start time; ignored");
            return vec![];
        };
        let Some(track) = signal.spotify_id.clone() else {
            tracing::warn!("playMedia without a song reference; ignored");
            return vec![];
        };

        // Refresh the estimate for the next computation; this one uses the
        // last good sample.
        let mut actions = self.poll_clock();

        let duration_ms = self
            .queue
            .entries()
            .iter()
            .find(|entry| entry.spotify_id == track)
            .and_then(|entry| entry.track.as_ref())
            .and_then(|track| track.duration_ms);

        let offset = self.clock_sync.estimate().offset_ms;
        let seek = seek_position(start_utc, duration_ms, self.now(), offset);

        tracing::info!(%track, seek_ms = seek, "starting synchronized playback");
        actions.push(Action::Play { track, offset_ms: seek });
        actions
    }

    fn handle_halt_media(&mut self, event: &'static str) -> Vec<Action> {
        if self.identity.is_none() || self.room.current().is_none() {
            tracing::debug!(event, "halt event without identity or room; ignored");
            return vec![];
        }

        vec![Action::Pause]
    }

    fn handle_direct_message(&mut self, message: DirectMessage) -> Vec<Action> {
        if self.identity.is_none() {
            tracing::debug!("directMessage before identity; dropped");
            return vec![];
        }

        if !self.dm.apply_message(message) {
            tracing::debug!("directMessage without an active conversation; dropped");
        }
        vec![]
    }

    fn handle_dm_history(&mut self, history: Vec<DirectMessage>) -> Vec<Action> {
        if self.identity.is_none() {
            tracing::debug!("dmHistory before identity; dropped");
            return vec![];
        }

        if !self.dm.apply_history(history) {
            tracing::debug!("dmHistory without an active conversation; dropped");
        }
        vec![]
    }

    fn handle_user_online(&mut self, user: &UserRef) -> Vec<Action> {
        if user.user_id == self.identity_id() {
            self.dm.mark_connected();
        } else {
            tracing::debug!(user_id = %user.user_id, "user came online");
        }
        vec![]
    }

    fn handle_emoji_reaction(&mut self, reaction: EmojiReaction) -> Vec<Action> {
        if self.identity.is_none() {
            return vec![];
        }
        // Our own reaction comes back through the broadcast; rendering it
        // twice would double every reaction locally.
        if reaction.user_id == self.identity_id() {
            return vec![];
        }

        self.room.publish_reaction(&reaction);
        vec![]
    }

    fn handle_queue_state(&mut self, snapshot: QueueSnapshot) -> Vec<Action> {
        if self.identity.is_none() {
            tracing::debug!("queueState before identity; dropped");
            return vec![];
        }

        let room = self.queue.apply_snapshot(snapshot);
        self.room.refresh_current(room);
        vec![]
    }

    fn handle_song_added(&mut self, event: SongEvent) -> Vec<Action> {
        if self.identity.is_none() {
            return vec![];
        }
        self.queue.apply_added(event.song);
        vec![]
    }

    fn handle_song_removed(&mut self, event: &SongEvent) -> Vec<Action> {
        if self.identity.is_none() {
            return vec![];
        }
        self.queue.apply_removed(&event.song.spotify_id);
        vec![]
    }

    fn handle_vote_updated(&mut self, event: SongEvent) -> Vec<Action> {
        if self.identity.is_none() {
            return vec![];
        }
        if !self.queue.apply_vote(event.song) {
            // The entry may have been dequeued concurrently; not an error.
            tracing::debug!("voteUpdated for a song no longer queued; dropped");
        }
        vec![]
    }

    fn identity_id(&self) -> &str {
        self.identity.as_ref().map_or("", |user| user.user_id.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chorus_core::clock::test_utils::MockClock;
    use chorus_proto::TimeSyncReply;

    use super::*;

    fn user(id: &str) -> UserProfile {
        UserProfile { user_id: id.into(), username: id.into(), profile_name: None }
    }

    fn room(id: &str, creator: &str) -> RoomInfo {
        RoomInfo {
            room_id: id.into(),
            creator: user(creator),
            room_name: None,
            queue_id: None,
        }
    }

    fn envelope_for(sender: &str) -> ChatEventEnvelope {
        ChatEventEnvelope {
            user_id: sender.into(),
            body: Some(ChatMessage {
                message_body: String::new(),
                sender: user(sender),
                room_id: "r1".into(),
                date_created: 0,
            }),
            error_message: None,
        }
    }

    /// Session with identity "me" cached and the handshake completed.
    fn connected_session() -> (Session<MockClock>, MockClock) {
        let clock = MockClock::at(1_000_000);
        let mut session = Session::new(clock.clone(), SessionConfig::default());

        let _ = session.initialize().unwrap();
        let _ = session.identity_fetched(Ok(user("me")));
        let _ = session.channel_opened();
        let _ = session.handle(ServerEvent::Connected(ChatEventEnvelope {
            user_id: "me".into(),
            body: None,
            error_message: None,
        }));

        assert_eq!(session.phase(), SessionPhase::Connected);
        (session, clock)
    }

    /// Connected session joined to room "r1".
    fn joined_session() -> (Session<MockClock>, MockClock) {
        let (mut session, clock) = connected_session();
        let _ = session.join_room("r1").unwrap();
        let _ = session.room_fetched(Ok(room("r1", "me")));
        let _ = session.handle(ServerEvent::UserJoinedRoom(envelope_for("me")));
        assert_eq!(session.phase(), SessionPhase::Joined);
        (session, clock)
    }

    fn history_request_count(actions: &[Action]) -> usize {
        actions
            .iter()
            .filter(|a| matches!(a, Action::Emit(Command::GetLiveChatHistory(_))))
            .count()
    }

    #[test]
    fn initialize_is_idempotent_under_reentry() {
        let mut session = Session::new(MockClock::at(0), SessionConfig::default());

        let actions = session.initialize().unwrap();
        assert_eq!(actions, vec![Action::FetchSelf]);

        // Re-entrant call from a second UI mount point while in flight.
        assert_eq!(session.initialize(), Err(NotReady::AlreadyConnecting));

        let _ = session.identity_fetched(Ok(user("me")));
        let _ = session.channel_opened();
        assert_eq!(session.initialize(), Err(NotReady::AlreadyConnecting));
    }

    #[test]
    fn failed_identity_lookup_aborts_initialization() {
        let mut session = Session::new(MockClock::at(0), SessionConfig::default());
        let _ = session.initialize().unwrap();

        let actions = session.identity_fetched(Err(DirectoryError::Unreachable {
            reason: "connection refused".into(),
        }));

        assert!(matches!(actions.as_slice(), [Action::Notify { .. }]));
        assert_eq!(session.phase(), SessionPhase::Disconnected);
        // Initialization can be retried from scratch.
        assert!(session.initialize().is_ok());
    }

    #[test]
    fn channel_open_handshakes_and_samples_the_clock() {
        let mut session = Session::new(MockClock::at(0), SessionConfig::default());
        let _ = session.initialize().unwrap();
        let _ = session.identity_fetched(Ok(user("me")));

        let actions = session.channel_opened();
        assert!(matches!(
            actions.first(),
            Some(Action::Emit(Command::ConnectUser(UserRef { user_id }))) if user_id == "me"
        ));
        assert!(actions.iter().any(|a| matches!(a, Action::Emit(Command::Ping))));
        assert!(actions.iter().any(|a| matches!(a, Action::Emit(Command::TimeSync(_)))));
    }

    #[test]
    fn rapid_double_join_requests_history_once() {
        let (mut session, _clock) = connected_session();

        let first = session.join_room("r1").unwrap();
        let second = session.join_room("r1").unwrap();
        assert!(first.iter().any(|a| matches!(a, Action::FetchRoom { .. })));
        assert!(second.iter().any(|a| matches!(a, Action::FetchRoom { .. })));

        let fetched_first = session.room_fetched(Ok(room("r1", "me")));
        let fetched_second = session.room_fetched(Ok(room("r1", "me")));

        let total =
            history_request_count(&fetched_first) + history_request_count(&fetched_second);
        assert_eq!(total, 1);
    }

    #[test]
    fn leave_room_resets_guards_for_a_fresh_join() {
        let (mut session, _clock) = joined_session();

        // The join's history request was never answered; its guard is set.
        assert!(session.chat_history_state().is_requested());

        let _ = session.leave_room().unwrap();
        assert_eq!(session.phase(), SessionPhase::Connected);
        assert!(session.current_room().is_none());

        // A fresh join of the same room issues a fresh history request.
        let _ = session.join_room("r1").unwrap();
        let actions = session.room_fetched(Ok(room("r1", "me")));
        assert_eq!(history_request_count(&actions), 1);
    }

    #[test]
    fn leave_room_requires_joined_phase() {
        let (mut session, _clock) = connected_session();
        assert_eq!(session.leave_room(), Err(NotReady::NotJoined));
    }

    #[test]
    fn blank_chat_message_is_refused() {
        let (mut session, _clock) = joined_session();
        assert_eq!(session.send_live_chat_message("   \t "), Err(NotReady::BlankMessage));
    }

    #[test]
    fn own_echo_clears_the_sending_flag() {
        let (mut session, _clock) = joined_session();
        let _ = session.send_live_chat_message("hello").unwrap();
        assert!(session.chat_state().sending);

        let mut echo = envelope_for("me");
        if let Some(body) = echo.body.as_mut() {
            body.message_body = "hello".into();
        }
        let _ = session.handle(ServerEvent::LiveMessage(echo));
        assert!(!session.chat_state().sending);
    }

    #[test]
    fn received_history_stops_further_requests() {
        let (mut session, _clock) = connected_session();
        let _ = session.join_room("r1").unwrap();
        let _ = session.room_fetched(Ok(room("r1", "me")));

        let _ = session.handle(ServerEvent::LiveChatHistory(vec![]));
        assert!(session.chat_history_state().is_received());

        // Once history is received, further messages do not re-request.
        let actions = session.handle(ServerEvent::LiveMessage(envelope_for("peer")));
        assert_eq!(history_request_count(&actions), 0);
        assert_eq!(session.chat_messages().len(), 1);
    }

    #[test]
    fn play_media_without_room_is_ignored() {
        let (mut session, _clock) = connected_session();

        let actions = session.handle(ServerEvent::PlayMedia(PlaybackSignal {
            user_id: "creator".into(),
            room_id: "r1".into(),
            spotify_id: Some("track-1".into()),
            utc_start: Some(0),
        }));

        assert!(actions.is_empty());
    }

    #[test]
    fn play_media_seeks_with_clock_offset_and_clamp() {
        let (mut session, clock) = joined_session();

        // Offset exchange: server 15ms ahead under symmetric latency.
        let now = clock.now_utc_ms();
        let _ = session.handle(ServerEvent::TimeSyncResponse(TimeSyncReply {
            t0: now - 100,
            t1: now - 50 + 15,
            t2: now - 50 + 15,
        }));
        assert_eq!(session.clock_estimate().offset_ms, 15);

        // Track of 3000ms that started 10s ago: seek clamps to the end.
        let _ = session.handle(ServerEvent::QueueState(QueueSnapshot {
            room: room("r1", "me"),
            songs: vec![QueueEntry {
                spotify_id: "track-1".into(),
                user_id: "me".into(),
                score: 0,
                index: 0,
                insert_time: 0,
                start_time: None,
                pause_time: None,
                track: Some(chorus_proto::TrackInfo {
                    name: None,
                    duration_ms: Some(3_000),
                }),
            }],
            votes: vec![],
        }));

        let actions = session.handle(ServerEvent::PlayMedia(PlaybackSignal {
            user_id: "me".into(),
            room_id: "r1".into(),
            spotify_id: Some("track-1".into()),
            utc_start: Some(clock.now_utc_ms() - 10_000),
        }));

        let play = actions.iter().find_map(|a| match a {
            Action::Play { track, offset_ms } => Some((track.clone(), *offset_ms)),
            _ => None,
        });
        assert_eq!(play, Some(("track-1".to_string(), 3_000)));
    }

    #[test]
    fn vote_update_for_unknown_song_leaves_queue_unchanged() {
        let (mut session, _clock) = joined_session();

        let _ = session.handle(ServerEvent::VoteUpdated(SongEvent {
            song: QueueEntry {
                spotify_id: "ghost".into(),
                user_id: "me".into(),
                score: 1,
                index: 0,
                insert_time: 0,
                start_time: None,
                pause_time: None,
                track: None,
            },
            room_id: "r1".into(),
            created_at: 0,
        }));

        assert!(session.queue_entries().is_empty());
    }

    #[test]
    fn tick_releases_a_wedged_history_guard() {
        let (mut session, clock) = joined_session();
        assert!(session.chat_history_state().is_requested());

        clock.advance(31_000);
        let _ = session.tick();
        assert!(!session.chat_history_state().is_requested());

        // The retry path is open again: a racing message re-requests.
        let actions = session.handle(ServerEvent::LiveMessage(envelope_for("peer")));
        assert_eq!(history_request_count(&actions), 1);
    }

    #[test]
    fn own_emoji_reflection_is_dropped() {
        let (mut session, _clock) = joined_session();
        let mut reactions = session.subscribe_reactions("overlay");

        let _ = session.handle(ServerEvent::EmojiReaction(EmojiReaction {
            date_created: 0,
            body: "🔥".into(),
            user_id: "me".into(),
        }));
        assert!(reactions.try_recv().is_none());

        let _ = session.handle(ServerEvent::EmojiReaction(EmojiReaction {
            date_created: 0,
            body: "🔥".into(),
            user_id: "peer".into(),
        }));
        assert!(reactions.try_recv().is_some());
    }

    #[test]
    fn disconnect_is_safe_to_repeat_and_clears_everything() {
        let (mut session, _clock) = joined_session();

        let actions = session.disconnect();
        assert_eq!(actions, vec![Action::CloseChannel]);
        assert_eq!(session.phase(), SessionPhase::Disconnected);
        assert!(session.identity().is_none());
        assert!(session.current_room().is_none());
        assert!(session.chat_messages().is_empty());

        assert!(session.disconnect().is_empty());
    }

    #[test]
    fn reconnect_handshake_rejoins_cached_room() {
        let (mut session, _clock) = joined_session();

        // The server restarts; a fresh `connected` handshake arrives while
        // the room reference is still cached.
        let actions = session.handle(ServerEvent::Connected(ChatEventEnvelope {
            user_id: "me".into(),
            body: None,
            error_message: None,
        }));

        assert_eq!(session.phase(), SessionPhase::Joining);
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::FetchRoom { room_id } if room_id == "r1"
        )));
    }

    #[test]
    fn dm_history_guard_is_idempotent() {
        let (mut session, _clock) = connected_session();
        let (_sub, _actions) = session.enter_dm(user("peer"), "thread").unwrap();

        let first = session.request_dm_history().unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(session.request_dm_history(), Err(NotReady::HistoryRequested));

        let _ = session.handle(ServerEvent::DmHistory(vec![]));
        assert_eq!(session.request_dm_history(), Err(NotReady::HistoryReceived));
    }

    #[test]
    fn dm_requires_conversation_and_subscriber() {
        let (mut session, _clock) = connected_session();
        assert_eq!(session.send_dm("hi"), Err(NotReady::NoConversation));

        let (sub, _actions) = session.enter_dm(user("peer"), "thread").unwrap();
        assert!(session.send_dm("hi").is_ok());
        assert_eq!(session.send_dm("  "), Err(NotReady::BlankMessage));
        drop(sub);
    }

    #[test]
    fn leave_dm_is_always_safe() {
        let (mut session, _clock) = connected_session();
        let actions = session.leave_dm();
        assert!(
            actions
                .iter()
                .any(|a| matches!(a, Action::Emit(Command::ExitDirectMessage(_))))
        );

        // No identity at all: still safe, nothing emitted.
        let mut bare = Session::new(MockClock::at(0), SessionConfig::default());
        assert!(bare.leave_dm().is_empty());
    }

    #[test]
    fn can_control_is_creator_only() {
        let (mut session, _clock) = connected_session();
        let _ = session.join_room("r1").unwrap();
        let _ = session.room_fetched(Ok(room("r1", "someone-else")));
        assert!(!session.can_control());

        let _ = session.join_room("r2").unwrap();
        let _ = session.room_fetched(Ok(room("r2", "me")));
        assert!(session.can_control());
    }
}
