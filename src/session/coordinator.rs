//! 투표 세션 코디네이터
//!
//! 단일 태스크가 명단, 투표, 타이머, 채팅 상태를 모두 소유하고 큐에 들어온
//! 명령을 하나씩 처리한다. 연결, 타이머 틱, 강퇴 후 종료 신호는 모두 같은 큐로
//! 들어오므로 공유 상태에 락이 필요 없다.

use super::broadcast::{to_all, to_connection};
use super::chat::ChatLog;
use super::poll::{PollDraft, PollSession};
use super::registry::{ConnectionRegistry, Outbound, Role};
use super::roster::{self, RosterChange, StudentSummary};
use super::timer::{TickOutcome, TimerEngine};
use crate::config::{Config, ReplacePolicy};
use crate::error::{CommandError, RegistryError};
use crate::protocol::{ClientMessage, OptionInput, ServerMessage};
use crate::store::{Persister, SharedStore};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

/// 코디네이터 큐 명령
#[derive(Debug)]
pub enum Command {
    Connect {
        connection_id: String,
        sender: UnboundedSender<Outbound>,
    },
    Disconnect {
        connection_id: String,
    },
    Client {
        connection_id: String,
        message: ClientMessage,
    },
    TimerTick {
        generation: u64,
    },
}

/// 투표 종료 사유
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EndReason {
    Manual,
    Timeout,
    AllSubmitted,
    Replaced,
}

/// 연결 태스크가 코디네이터에 명령을 넣는 핸들
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: UnboundedSender<Command>,
}

impl CoordinatorHandle {
    /// 새 연결 등록. 발급된 connection_id 반환
    pub fn connect(&self, sender: UnboundedSender<Outbound>) -> String {
        let connection_id = Uuid::new_v4().to_string();
        self.submit(Command::Connect {
            connection_id: connection_id.clone(),
            sender,
        });
        connection_id
    }

    pub fn dispatch(&self, connection_id: &str, message: ClientMessage) {
        self.submit(Command::Client {
            connection_id: connection_id.to_string(),
            message,
        });
    }

    pub fn disconnect(&self, connection_id: &str) {
        self.submit(Command::Disconnect {
            connection_id: connection_id.to_string(),
        });
    }

    fn submit(&self, command: Command) {
        if self.tx.send(command).is_err() {
            tracing::error!("Coordinator is not running, command dropped");
        }
    }
}

pub struct Coordinator {
    config: Arc<Config>,
    registry: ConnectionRegistry,
    session: PollSession,
    timer: TimerEngine,
    chat: ChatLog,
    persister: Persister,
    queue: UnboundedSender<Command>,
}

impl Coordinator {
    pub fn new(config: Arc<Config>, store: SharedStore) -> (Self, UnboundedReceiver<Command>) {
        let (queue, rx) = mpsc::unbounded_channel();
        let coordinator = Self {
            registry: ConnectionRegistry::new(),
            session: PollSession::new(),
            timer: TimerEngine::new(),
            chat: ChatLog::new(config.chat.capacity),
            persister: Persister::spawn(store),
            queue,
            config,
        };
        (coordinator, rx)
    }

    /// 코디네이터 태스크 시작
    pub fn spawn(config: Arc<Config>, store: SharedStore) -> CoordinatorHandle {
        let (coordinator, rx) = Self::new(config, store);
        let handle = CoordinatorHandle {
            tx: coordinator.queue.clone(),
        };
        tokio::spawn(coordinator.run(rx));
        handle
    }

    async fn run(mut self, mut rx: UnboundedReceiver<Command>) {
        tracing::info!("Poll coordinator started");
        while let Some(command) = rx.recv().await {
            self.handle(command);
        }
        tracing::info!("Poll coordinator stopped");
    }

    pub fn handle(&mut self, command: Command) {
        match command {
            Command::Connect {
                connection_id,
                sender,
            } => self.handle_connect(&connection_id, sender),
            Command::Disconnect { connection_id } => self.handle_disconnect(&connection_id),
            Command::TimerTick { generation } => self.handle_tick(generation),
            Command::Client {
                connection_id,
                message,
            } => {
                if let Err(e) = self.handle_client(&connection_id, message) {
                    self.reject(&connection_id, e);
                }
            }
        }
    }

    fn handle_client(&mut self, connection_id: &str, message: ClientMessage) -> Result<(), CommandError> {
        if self.registry.get(connection_id).is_none() {
            return Err(RegistryError::NotFound(connection_id.to_string()).into());
        }

        match message {
            ClientMessage::Heartbeat => {
                to_connection(&self.registry, connection_id, ServerMessage::HeartbeatAck);
                Ok(())
            }
            ClientMessage::JoinTeacher => self.join_teacher(connection_id),
            ClientMessage::JoinStudent { name } => self.join_student(connection_id, &name),
            ClientMessage::KickStudent { student_id } => self.kick_student(connection_id, &student_id),
            ClientMessage::CreatePoll {
                question,
                options,
                duration,
                correct_option_id,
            } => self.create_poll(connection_id, question, options, duration, correct_option_id),
            ClientMessage::SubmitAnswer { poll_id, option_id } => {
                self.submit_answer(connection_id, &poll_id, &option_id)
            }
            ClientMessage::EndPoll { poll_id } => self.end_poll(connection_id, &poll_id),
            ClientMessage::SendChatMessage {
                text,
                sender,
                is_teacher,
            } => self.post_chat(&text, &sender, is_teacher),
        }
    }

    /// 요청한 연결에만 거부 사유 전달
    fn reject(&self, connection_id: &str, error: CommandError) {
        if let CommandError::Registry(e) = &error {
            tracing::debug!(connection_id = %connection_id, error = %e, "Ignored command from unknown connection");
            return;
        }

        tracing::debug!(connection_id = %connection_id, code = error.code(), error = %error, "Command rejected");
        to_connection(
            &self.registry,
            connection_id,
            ServerMessage::Error {
                code: error.code().to_string(),
                message: error.to_string(),
            },
        );
    }

    fn require_role(&self, connection_id: &str, role: Role, action: &'static str) -> Result<(), CommandError> {
        let connection = self
            .registry
            .get(connection_id)
            .ok_or_else(|| RegistryError::NotFound(connection_id.to_string()))?;
        match connection.role {
            Some(r) if r == role => Ok(()),
            Some(_) => Err(CommandError::Forbidden(action, role.as_str())),
            None => Err(CommandError::NotJoined(role.as_str())),
        }
    }

    fn handle_connect(&mut self, connection_id: &str, sender: UnboundedSender<Outbound>) {
        self.registry.register(connection_id, sender);
        to_connection(
            &self.registry,
            connection_id,
            ServerMessage::Connected {
                socket_id: connection_id.to_string(),
            },
        );
        tracing::info!(connection_id = %connection_id, connections = self.registry.len(), "New connection established");
    }

    fn handle_disconnect(&mut self, connection_id: &str) {
        match self.registry.remove(connection_id) {
            Ok(connection) => {
                // 제출하지 않은 학생이 나가도 투표 종료 판정은 하지 않는다
                if connection.is_student() {
                    roster::publish(&self.registry, RosterChange::Left(connection.id));
                }
                tracing::info!(connection_id = %connection_id, "Connection closed");
            }
            Err(_) => {
                tracing::debug!(connection_id = %connection_id, "Disconnect for already removed connection");
            }
        }
    }

    fn join_teacher(&mut self, connection_id: &str) -> Result<(), CommandError> {
        let was_student = self
            .registry
            .get(connection_id)
            .map(|c| c.is_student())
            .unwrap_or(false);
        self.registry.set_role(connection_id, Role::Teacher, None)?;
        if was_student {
            roster::publish(&self.registry, RosterChange::Left(connection_id.to_string()));
        }

        tracing::info!(connection_id = %connection_id, "Teacher joined");
        self.send_snapshot(connection_id, true);
        Ok(())
    }

    fn join_student(&mut self, connection_id: &str, name: &str) -> Result<(), CommandError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CommandError::Validation("Student name must not be empty".into()));
        }

        let was_student = self
            .registry
            .get(connection_id)
            .map(|c| c.is_student())
            .unwrap_or(false);
        self.registry
            .set_role(connection_id, Role::Student, Some(name.to_string()))?;

        if was_student {
            to_all(&self.registry, ServerMessage::StudentsUpdate(roster::roster(&self.registry)));
        } else {
            roster::publish(
                &self.registry,
                RosterChange::Joined(StudentSummary {
                    id: connection_id.to_string(),
                    name: name.to_string(),
                }),
            );
        }

        self.send_snapshot(connection_id, false);
        Ok(())
    }

    /// 참여 직후 현재 상태 전달
    fn send_snapshot(&self, connection_id: &str, with_roster: bool) {
        if with_roster {
            to_connection(
                &self.registry,
                connection_id,
                ServerMessage::StudentsUpdate(roster::roster(&self.registry)),
            );
        }

        if let Some(poll) = self.session.current() {
            to_connection(&self.registry, connection_id, ServerMessage::PollCreated(poll.public_view()));
            if poll.is_active {
                to_connection(
                    &self.registry,
                    connection_id,
                    ServerMessage::TimerUpdate {
                        seconds_remaining: poll.remaining_seconds(Utc::now()),
                    },
                );
            }
        }

        to_connection(&self.registry, connection_id, ServerMessage::ChatHistory(self.chat.history()));
        tracing::debug!(connection_id = %connection_id, phase = ?self.session.phase(), "Sent join snapshot");
    }

    fn kick_student(&mut self, connection_id: &str, student_id: &str) -> Result<(), CommandError> {
        self.require_role(connection_id, Role::Teacher, "Kicking students")?;

        let is_student = self
            .registry
            .get(student_id)
            .map(|c| c.is_student())
            .unwrap_or(false);
        if !is_student {
            return Err(CommandError::UnknownStudent(student_id.to_string()));
        }

        // 강퇴 알림이 종료 신호보다 먼저 같은 큐에 들어간다
        to_connection(&self.registry, student_id, ServerMessage::YouWereKicked);
        let kicked = self.registry.remove(student_id)?;
        roster::publish(&self.registry, RosterChange::Kicked(kicked.id.clone()));

        let grace = self.config.roster.kick_grace();
        let sender = kicked.sender;
        let kicked_id = kicked.id;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if sender.send(Outbound::Close).is_ok() {
                tracing::debug!(connection_id = %kicked_id, "Closing kicked connection");
            }
        });
        Ok(())
    }

    fn create_poll(
        &mut self,
        connection_id: &str,
        question: String,
        options: Vec<OptionInput>,
        duration: u32,
        correct_option_id: Option<String>,
    ) -> Result<(), CommandError> {
        self.require_role(connection_id, Role::Teacher, "Creating polls")?;

        let draft = PollDraft {
            question,
            options,
            duration_seconds: duration,
            correct_option_id,
        };
        let poll = draft.into_poll(self.config.poll.max_duration_secs, Utc::now())?;

        if let Some(previous_id) = self.session.active().map(|p| p.id.clone()) {
            match self.config.poll.replace_policy {
                ReplacePolicy::Reject => return Err(CommandError::PollAlreadyActive),
                ReplacePolicy::Replace => {
                    tracing::info!(poll_id = %previous_id, "Replacing active poll");
                    self.finish_poll(&previous_id, EndReason::Replaced);
                }
            }
        }

        self.registry.reset_submissions();
        let poll = self.session.start(poll);
        self.persister.save(poll);
        to_all(&self.registry, ServerMessage::PollCreated(poll.public_view()));

        let generation = self.timer.start(
            poll.duration_seconds,
            self.config.poll.tick_interval(),
            self.queue.clone(),
        );
        to_all(
            &self.registry,
            ServerMessage::TimerUpdate {
                seconds_remaining: poll.duration_seconds,
            },
        );

        tracing::info!(
            poll_id = %poll.id,
            options = poll.options.len(),
            duration = poll.duration_seconds,
            generation = generation,
            "Poll created"
        );
        Ok(())
    }

    fn submit_answer(&mut self, connection_id: &str, poll_id: &str, option_id: &str) -> Result<(), CommandError> {
        self.require_role(connection_id, Role::Student, "Submitting answers")?;

        if self.session.active().map(|p| p.id.as_str()) != Some(poll_id) {
            return Err(CommandError::StalePoll(poll_id.to_string()));
        }
        if self
            .registry
            .get(connection_id)
            .map(|c| c.has_submitted)
            .unwrap_or(false)
        {
            return Err(CommandError::AlreadySubmitted);
        }

        let poll = self.session.record_vote(poll_id, option_id)?;
        let results = ServerMessage::PollResults {
            poll_id: poll.id.clone(),
            options: poll.options.clone(),
        };
        self.registry.mark_submitted(connection_id)?;
        to_all(&self.registry, results);

        tracing::debug!(connection_id = %connection_id, poll_id = %poll_id, option_id = %option_id, "Answer recorded");

        if self.registry.all_submitted() {
            tracing::info!(poll_id = %poll_id, "All students have submitted, ending poll");
            self.finish_poll(poll_id, EndReason::AllSubmitted);
        }
        Ok(())
    }

    fn end_poll(&mut self, connection_id: &str, poll_id: &str) -> Result<(), CommandError> {
        self.require_role(connection_id, Role::Teacher, "Ending polls")?;

        if !self.finish_poll(poll_id, EndReason::Manual) {
            tracing::debug!(poll_id = %poll_id, "Ignored end request for inactive poll");
        }
        Ok(())
    }

    /// 진행 중인 투표 종료. 실제로 전환된 경우 true
    fn finish_poll(&mut self, poll_id: &str, reason: EndReason) -> bool {
        let Some(poll) = self.session.end(poll_id) else {
            return false;
        };
        self.timer.cancel();
        self.persister.save_ended(poll);

        let poll_id = poll.id.clone();
        let correct_option_id = poll.correct_option_id.clone();
        let message = match reason {
            EndReason::Timeout | EndReason::AllSubmitted => ServerMessage::PollTimeout {
                poll_id,
                correct_option_id,
            },
            EndReason::Manual | EndReason::Replaced => ServerMessage::PollEnded {
                poll_id,
                correct_option_id,
            },
        };
        to_all(&self.registry, message);

        tracing::info!(poll_id = %poll.id, reason = ?reason, "Poll ended");
        true
    }

    fn handle_tick(&mut self, generation: u64) {
        match self.timer.on_tick(generation) {
            TickOutcome::Stale => {
                tracing::trace!(generation = generation, "Ignored stale timer tick");
            }
            TickOutcome::Remaining(seconds_remaining) => {
                to_all(&self.registry, ServerMessage::TimerUpdate { seconds_remaining });
            }
            TickOutcome::Expired => {
                to_all(&self.registry, ServerMessage::TimerUpdate { seconds_remaining: 0 });
                if let Some(poll_id) = self.session.active().map(|p| p.id.clone()) {
                    self.finish_poll(&poll_id, EndReason::Timeout);
                }
            }
        }
    }

    fn post_chat(&mut self, text: &str, sender: &str, is_teacher: bool) -> Result<(), CommandError> {
        let message = self.chat.post(text, sender, is_teacher, Utc::now())?.clone();
        tracing::info!(sender = %message.sender, is_teacher = is_teacher, "Chat message");
        to_all(&self.registry, ServerMessage::ChatMessage(message));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::session::Poll;
    use crate::store::{MemoryPollStore, PollPatch, PollStore};
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use std::time::Duration;

    struct Harness {
        coordinator: Coordinator,
        _queue: UnboundedReceiver<Command>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_config(Config::default(), Arc::new(MemoryPollStore::new()))
        }

        fn with_config(mut config: Config, store: SharedStore) -> Self {
            config.roster.kick_grace_ms = 20;
            let (coordinator, queue) = Coordinator::new(Arc::new(config), store);
            Self {
                coordinator,
                _queue: queue,
            }
        }

        fn connect(&mut self, id: &str) -> UnboundedReceiver<Outbound> {
            let (tx, rx) = mpsc::unbounded_channel();
            self.coordinator.handle(Command::Connect {
                connection_id: id.to_string(),
                sender: tx,
            });
            rx
        }

        fn send(&mut self, id: &str, message: ClientMessage) {
            self.coordinator.handle(Command::Client {
                connection_id: id.to_string(),
                message,
            });
        }

        fn teacher(&mut self, id: &str) -> UnboundedReceiver<Outbound> {
            let rx = self.connect(id);
            self.send(id, ClientMessage::JoinTeacher);
            rx
        }

        fn student(&mut self, id: &str, name: &str) -> UnboundedReceiver<Outbound> {
            let rx = self.connect(id);
            self.send(id, ClientMessage::JoinStudent { name: name.to_string() });
            rx
        }

        fn create_poll(&mut self, teacher: &str, duration: u32) -> String {
            self.send(
                teacher,
                ClientMessage::CreatePoll {
                    question: "Q".into(),
                    options: vec![
                        OptionInput { id: Some("1".into()), text: "A".into() },
                        OptionInput { id: Some("2".into()), text: "B".into() },
                    ],
                    duration,
                    correct_option_id: Some("2".into()),
                },
            );
            self.active().expect("poll should be active").id.clone()
        }

        fn submit(&mut self, student: &str, poll_id: &str, option_id: &str) {
            self.send(
                student,
                ClientMessage::SubmitAnswer {
                    poll_id: poll_id.into(),
                    option_id: option_id.into(),
                },
            );
        }

        fn active(&self) -> Option<&Poll> {
            self.coordinator.session.active()
        }

        fn tallies(&self) -> Vec<u32> {
            self.coordinator
                .session
                .current()
                .map(|p| p.options.iter().map(|o| o.votes).collect())
                .unwrap_or_default()
        }

        fn tick(&mut self) {
            let generation = self.coordinator.timer.generation();
            self.coordinator.handle(Command::TimerTick { generation });
        }
    }

    fn drain(rx: &mut UnboundedReceiver<Outbound>) -> Vec<ServerMessage> {
        let mut events = Vec::new();
        while let Ok(outbound) = rx.try_recv() {
            if let Outbound::Event(message) = outbound {
                events.push(message);
            }
        }
        events
    }

    struct FailingStore;

    #[async_trait]
    impl PollStore for FailingStore {
        async fn create(&self, poll: &Poll) -> Result<(), StoreError> {
            Err(StoreError::AlreadyExists(poll.id.clone()))
        }

        async fn update(&self, poll_id: &str, _patch: PollPatch) -> Result<(), StoreError> {
            Err(StoreError::NotFound(poll_id.to_string()))
        }

        async fn get(&self, poll_id: &str) -> Result<Option<Poll>, StoreError> {
            Err(StoreError::NotFound(poll_id.to_string()))
        }

        async fn list(&self) -> Result<Vec<Poll>, StoreError> {
            Err(StoreError::NotFound("offline".into()))
        }

        async fn list_active(&self) -> Result<Vec<Poll>, StoreError> {
            Err(StoreError::NotFound("offline".into()))
        }
    }

    #[tokio::test]
    async fn poll_creation_broadcasts_poll_then_full_timer() {
        let mut h = Harness::new();
        let mut teacher = h.teacher("t");
        let mut student = h.student("s", "Ada");
        drain(&mut teacher);
        drain(&mut student);

        h.create_poll("t", 30);

        let events = drain(&mut student);
        assert!(matches!(&events[0], ServerMessage::PollCreated(p) if p.is_active && p.correct_option_id.is_none()));
        assert!(matches!(events[1], ServerMessage::TimerUpdate { seconds_remaining: 30 }));
    }

    #[tokio::test]
    async fn replacing_keeps_a_single_active_poll() {
        let mut h = Harness::new();
        let mut teacher = h.teacher("t");
        let first = h.create_poll("t", 30);
        drain(&mut teacher);

        let second = h.create_poll("t", 30);

        assert_ne!(first, second);
        assert_eq!(h.active().unwrap().id, second);
        let events = drain(&mut teacher);
        assert!(matches!(&events[0], ServerMessage::PollEnded { poll_id, .. } if *poll_id == first));
        assert!(matches!(&events[1], ServerMessage::PollCreated(p) if p.id == second));
    }

    #[tokio::test]
    async fn reject_policy_refuses_second_poll() {
        let mut config = Config::default();
        config.poll.replace_policy = ReplacePolicy::Reject;
        let mut h = Harness::with_config(config, Arc::new(MemoryPollStore::new()));
        let mut teacher = h.teacher("t");
        let first = h.create_poll("t", 30);
        drain(&mut teacher);

        h.create_poll("t", 30);

        assert_eq!(h.active().unwrap().id, first);
        let events = drain(&mut teacher);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], ServerMessage::Error { code, .. } if code == "poll_already_active"));
    }

    #[tokio::test]
    async fn students_cannot_create_polls() {
        let mut h = Harness::new();
        let mut student = h.student("s", "Ada");
        drain(&mut student);

        h.send(
            "s",
            ClientMessage::CreatePoll {
                question: "Q".into(),
                options: vec![
                    OptionInput { id: None, text: "A".into() },
                    OptionInput { id: None, text: "B".into() },
                ],
                duration: 30,
                correct_option_id: None,
            },
        );

        assert!(h.active().is_none());
        let events = drain(&mut student);
        assert!(matches!(&events[0], ServerMessage::Error { code, .. } if code == "forbidden"));
    }

    #[tokio::test]
    async fn stale_submission_leaves_tallies_untouched() {
        let mut h = Harness::new();
        let _teacher = h.teacher("t");
        let mut student = h.student("s", "Ada");
        let _other = h.student("s2", "Bob");
        h.create_poll("t", 30);
        drain(&mut student);

        h.submit("s", "not-the-poll", "1");

        assert_eq!(h.tallies(), vec![0, 0]);
        let events = drain(&mut student);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], ServerMessage::Error { code, .. } if code == "stale_poll"));
    }

    #[tokio::test]
    async fn duplicate_submission_is_rejected() {
        let mut h = Harness::new();
        let _teacher = h.teacher("t");
        let mut student = h.student("s", "Ada");
        let _other = h.student("s2", "Bob");
        let poll_id = h.create_poll("t", 30);

        h.submit("s", &poll_id, "1");
        drain(&mut student);
        h.submit("s", &poll_id, "2");

        assert_eq!(h.tallies(), vec![1, 0]);
        let events = drain(&mut student);
        assert!(matches!(&events[0], ServerMessage::Error { code, .. } if code == "already_submitted"));
    }

    #[tokio::test]
    async fn rejoining_as_student_does_not_grant_a_second_vote() {
        let mut h = Harness::new();
        let _teacher = h.teacher("t");
        let mut voter = h.student("s1", "Ada");
        let _other = h.student("s2", "Bob");
        let poll_id = h.create_poll("t", 30);
        h.submit("s1", &poll_id, "1");

        h.send("s1", ClientMessage::JoinTeacher);
        assert_eq!(h.tallies(), vec![1, 0]);
        h.send("s1", ClientMessage::JoinStudent { name: "Ada".into() });
        assert_eq!(h.tallies(), vec![1, 0]);
        drain(&mut voter);

        h.submit("s1", &poll_id, "1");

        assert_eq!(h.tallies(), vec![1, 0]);
        assert_eq!(h.active().unwrap().id, poll_id);
        let events = drain(&mut voter);
        assert!(matches!(&events[0], ServerMessage::Error { code, .. } if code == "already_submitted"));
    }

    #[tokio::test]
    async fn poll_ends_once_every_student_submitted() {
        let mut h = Harness::new();
        let mut teacher = h.teacher("t");
        let _s1 = h.student("s1", "Ada");
        let mut s2 = h.student("s2", "Bob");
        let poll_id = h.create_poll("t", 30);

        h.submit("s1", &poll_id, "1");
        assert!(h.active().is_some());
        drain(&mut teacher);

        h.submit("s2", &poll_id, "2");

        assert!(h.active().is_none());
        let events = drain(&mut teacher);
        assert!(matches!(&events[0], ServerMessage::PollResults { options, .. } if options[1].votes == 1));
        assert!(matches!(
            &events[1],
            ServerMessage::PollTimeout { poll_id: id, correct_option_id: Some(c) } if *id == poll_id && c == "2"
        ));

        // 종료 후 늦은 제출은 거부된다
        let _late = h.student("s3", "Cy");
        drain(&mut s2);
        h.submit("s3", &poll_id, "1");
        assert_eq!(h.tallies(), vec![1, 1]);
        assert!(drain(&mut s2).is_empty());
    }

    #[tokio::test]
    async fn departing_student_does_not_complete_poll() {
        let mut h = Harness::new();
        let _teacher = h.teacher("t");
        let _s1 = h.student("s1", "Ada");
        let _s2 = h.student("s2", "Bob");
        let poll_id = h.create_poll("t", 30);

        h.submit("s1", &poll_id, "1");
        h.coordinator.handle(Command::Disconnect {
            connection_id: "s2".into(),
        });

        assert!(h.active().is_some());
    }

    #[tokio::test]
    async fn poll_without_students_ends_by_timeout() {
        let mut h = Harness::new();
        let mut teacher = h.teacher("t");
        let poll_id = h.create_poll("t", 30);
        drain(&mut teacher);

        for _ in 0..29 {
            h.tick();
        }
        assert!(h.active().is_some());
        let events = drain(&mut teacher);
        assert!(matches!(events.last(), Some(ServerMessage::TimerUpdate { seconds_remaining: 1 })));

        h.tick();

        assert!(h.active().is_none());
        let events = drain(&mut teacher);
        assert!(matches!(events[0], ServerMessage::TimerUpdate { seconds_remaining: 0 }));
        assert!(matches!(&events[1], ServerMessage::PollTimeout { poll_id: id, .. } if *id == poll_id));
    }

    #[tokio::test]
    async fn stale_ticks_are_ignored() {
        let mut h = Harness::new();
        let mut teacher = h.teacher("t");
        h.create_poll("t", 30);
        let old_generation = h.coordinator.timer.generation();
        h.create_poll("t", 30);
        drain(&mut teacher);

        h.coordinator.handle(Command::TimerTick {
            generation: old_generation,
        });

        assert!(drain(&mut teacher).is_empty());
    }

    #[tokio::test]
    async fn ending_with_wrong_id_changes_nothing() {
        let mut h = Harness::new();
        let mut teacher = h.teacher("t");
        let mut student = h.student("s", "Ada");
        let poll_id = h.create_poll("t", 30);
        drain(&mut teacher);
        drain(&mut student);

        h.send("t", ClientMessage::EndPoll { poll_id: "other".into() });

        assert_eq!(h.active().unwrap().id, poll_id);
        assert!(drain(&mut teacher).is_empty());
        assert!(drain(&mut student).is_empty());

        h.send("t", ClientMessage::EndPoll { poll_id: poll_id.clone() });
        assert!(h.active().is_none());
        assert!(matches!(&drain(&mut student)[0], ServerMessage::PollEnded { poll_id: id, .. } if *id == poll_id));
    }

    #[tokio::test]
    async fn late_joiner_gets_clock_derived_remaining_time() {
        let mut h = Harness::new();
        let _teacher = h.teacher("t");
        h.create_poll("t", 30);
        if let Some(poll) = h.coordinator.session.current_mut() {
            poll.created_at = poll.created_at - ChronoDuration::seconds(12);
        }

        let mut late = h.student("late", "Zed");
        let events = drain(&mut late);

        let remaining = events.iter().find_map(|e| match e {
            ServerMessage::TimerUpdate { seconds_remaining } => Some(*seconds_remaining),
            _ => None,
        });
        let remaining = remaining.expect("late joiner should receive remaining time");
        assert!((17..=18).contains(&remaining), "remaining was {remaining}");
        assert!(events
            .iter()
            .any(|e| matches!(e, ServerMessage::PollCreated(p) if p.correct_option_id.is_none())));
    }

    #[tokio::test]
    async fn kicked_student_is_notified_before_close() {
        let mut h = Harness::new();
        let mut teacher = h.teacher("t");
        let mut kicked = h.student("s1", "Ada");
        let _stay = h.student("s2", "Bob");
        drain(&mut teacher);
        drain(&mut kicked);

        h.send("t", ClientMessage::KickStudent { student_id: "s1".into() });

        assert!(matches!(kicked.try_recv(), Ok(Outbound::Event(ServerMessage::YouWereKicked))));
        let close = tokio::time::timeout(Duration::from_secs(1), kicked.recv()).await.unwrap();
        assert!(matches!(close, Some(Outbound::Close)));

        let events = drain(&mut teacher);
        assert!(matches!(&events[0], ServerMessage::StudentKicked { id } if id == "s1"));
        assert!(matches!(
            &events[1],
            ServerMessage::StudentsUpdate(roster) if roster.len() == 1 && roster[0].id == "s2"
        ));

        // 강퇴 후 소켓 종료로 들어오는 disconnect는 무시된다
        h.coordinator.handle(Command::Disconnect {
            connection_id: "s1".into(),
        });
        assert!(drain(&mut teacher).is_empty());
    }

    #[tokio::test]
    async fn roster_changes_reach_everyone() {
        let mut h = Harness::new();
        let mut teacher = h.teacher("t");
        let mut first = h.student("s1", "Ada");
        drain(&mut teacher);
        drain(&mut first);

        let _second = h.student("s2", "Bob");

        let teacher_events = drain(&mut teacher);
        assert!(matches!(&teacher_events[0], ServerMessage::StudentJoined(s) if s.name == "Bob"));
        let student_events = drain(&mut first);
        assert_eq!(student_events.len(), 1);
        assert!(matches!(&student_events[0], ServerMessage::StudentsUpdate(r) if r.len() == 2));

        h.coordinator.handle(Command::Disconnect {
            connection_id: "s2".into(),
        });
        let teacher_events = drain(&mut teacher);
        assert!(matches!(&teacher_events[0], ServerMessage::StudentLeft { id } if id == "s2"));
        assert!(matches!(&teacher_events[1], ServerMessage::StudentsUpdate(r) if r.len() == 1));
    }

    #[tokio::test]
    async fn student_turning_teacher_leaves_the_roster() {
        let mut h = Harness::new();
        let mut teacher = h.teacher("t");
        let mut switcher = h.student("s1", "Ada");
        let mut other = h.student("s2", "Bob");
        drain(&mut teacher);
        drain(&mut switcher);
        drain(&mut other);

        h.send("s1", ClientMessage::JoinTeacher);

        let events = drain(&mut teacher);
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], ServerMessage::StudentLeft { id } if id == "s1"));
        assert!(matches!(
            &events[1],
            ServerMessage::StudentsUpdate(roster) if roster.len() == 1 && roster[0].id == "s2"
        ));

        let events = drain(&mut other);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], ServerMessage::StudentsUpdate(roster) if roster.len() == 1));

        // 교사 스냅샷에는 자신이 빠진 명단이 들어 있다
        let events = drain(&mut switcher);
        assert!(matches!(events.last(), Some(ServerMessage::ChatHistory(_))));
        assert!(events
            .iter()
            .all(|e| !matches!(e, ServerMessage::StudentsUpdate(r) if r.iter().any(|s| s.id == "s1"))));
    }

    #[tokio::test]
    async fn renaming_student_updates_roster_without_new_join() {
        let mut h = Harness::new();
        let mut teacher = h.teacher("t");
        let mut renamed = h.student("s1", "Ada");
        let mut other = h.student("s2", "Bob");
        drain(&mut teacher);
        drain(&mut renamed);
        drain(&mut other);

        h.send("s1", ClientMessage::JoinStudent { name: "Ada L.".into() });

        for events in [drain(&mut teacher), drain(&mut other)] {
            assert_eq!(events.len(), 1);
            assert!(matches!(
                &events[0],
                ServerMessage::StudentsUpdate(roster)
                    if roster.len() == 2 && roster[0].id == "s1" && roster[0].name == "Ada L."
            ));
        }
    }

    #[tokio::test]
    async fn teacher_joining_mid_poll_gets_roster_poll_then_timer() {
        let mut h = Harness::new();
        let _first = h.teacher("t1");
        let _student = h.student("s", "Ada");
        let poll_id = h.create_poll("t1", 30);
        if let Some(poll) = h.coordinator.session.current_mut() {
            poll.created_at = poll.created_at - ChronoDuration::seconds(12);
        }

        let mut second = h.teacher("t2");
        let events = drain(&mut second);

        assert!(matches!(&events[0], ServerMessage::Connected { socket_id } if socket_id == "t2"));
        assert!(matches!(
            &events[1],
            ServerMessage::StudentsUpdate(roster) if roster.len() == 1 && roster[0].name == "Ada"
        ));
        assert!(matches!(
            &events[2],
            ServerMessage::PollCreated(p) if p.id == poll_id && p.correct_option_id.is_none()
        ));
        match &events[3] {
            ServerMessage::TimerUpdate { seconds_remaining } => {
                assert!((17..=18).contains(seconds_remaining), "remaining was {seconds_remaining}")
            }
            other => panic!("expected timer update, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn chat_is_broadcast_and_bounded() {
        let mut h = Harness::new();
        let mut teacher = h.teacher("t");
        let _student = h.student("s", "Ada");
        drain(&mut teacher);

        h.send(
            "s",
            ClientMessage::SendChatMessage {
                text: "hello".into(),
                sender: "Ada".into(),
                is_teacher: false,
            },
        );
        assert!(matches!(&drain(&mut teacher)[0], ServerMessage::ChatMessage(m) if m.text == "hello"));

        for i in 0..120 {
            h.send(
                "t",
                ClientMessage::SendChatMessage {
                    text: format!("note {i}"),
                    sender: "Teacher".into(),
                    is_teacher: true,
                },
            );
        }
        assert_eq!(h.coordinator.chat.len(), 100);

        h.send(
            "t",
            ClientMessage::SendChatMessage {
                text: "".into(),
                sender: "Teacher".into(),
                is_teacher: true,
            },
        );
        assert_eq!(h.coordinator.chat.len(), 100);
    }

    #[tokio::test]
    async fn store_failures_do_not_block_broadcast() {
        let mut h = Harness::with_config(Config::default(), Arc::new(FailingStore));
        let mut teacher = h.teacher("t");
        let mut student = h.student("s", "Ada");
        drain(&mut teacher);
        drain(&mut student);

        let poll_id = h.create_poll("t", 30);
        h.submit("s", &poll_id, "1");

        assert!(h.active().is_none());
        let events = drain(&mut student);
        assert!(events.iter().any(|e| matches!(e, ServerMessage::PollCreated(_))));
        assert!(events.iter().any(|e| matches!(e, ServerMessage::PollTimeout { .. })));
    }

    #[tokio::test]
    async fn commands_from_unknown_connections_are_ignored() {
        let mut h = Harness::new();
        let mut teacher = h.teacher("t");
        drain(&mut teacher);

        h.send("ghost", ClientMessage::JoinStudent { name: "Boo".into() });
        h.coordinator.handle(Command::Disconnect {
            connection_id: "ghost".into(),
        });

        assert!(h.coordinator.registry.all_students().is_empty());
        assert!(drain(&mut teacher).is_empty());
    }
}
