//! End-to-end driver tests against mock collaborators.
//!
//! These drive the full path: operation → actions → transport/directory/
//! playback, and inbound delivery → decode → session → follow-up actions.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chorus_client::{
    Clock, CredentialProvider, DeviceId, Directory, DirectoryError, DriverError, EventTransport,
    NotReady, PlaybackDriver, PlaybackError, Session, SessionConfig, SessionDriver, SessionPhase,
    test_utils::MockClock,
};
use chorus_proto::{Delivery, RoomInfo, UserProfile};
use serde_json::{Value, json};
use thiserror::Error;

#[derive(Error, Debug)]
#[error("mock transport failure")]
struct MockTransportError;

/// Records sends; acks pings by queueing an inbound `pong`.
#[derive(Default)]
struct MockTransport {
    sent: Vec<(String, Value)>,
    inbound: VecDeque<(String, Value)>,
    open: bool,
}

#[async_trait]
impl EventTransport for MockTransport {
    type Error = MockTransportError;

    async fn open(&mut self) -> Result<(), Self::Error> {
        self.open = true;
        Ok(())
    }

    async fn send(
        &mut self,
        name: &str,
        payload: Value,
        _delivery: Delivery,
    ) -> Result<(), Self::Error> {
        if name == "ping" {
            self.inbound.push_back(("pong".into(), Value::Null));
        }
        self.sent.push((name.to_string(), payload));
        Ok(())
    }

    async fn recv(&mut self) -> Option<(String, Value)> {
        self.inbound.pop_front()
    }

    async fn close(&mut self) -> Result<(), Self::Error> {
        self.open = false;
        Ok(())
    }
}

struct MockDirectory {
    profile: Result<UserProfile, DirectoryError>,
    room: Result<RoomInfo, DirectoryError>,
}

#[async_trait]
impl Directory for MockDirectory {
    async fn fetch_self(&self, _token: &str) -> Result<UserProfile, DirectoryError> {
        self.profile.clone()
    }

    async fn fetch_room(&self, _token: &str, _room_id: &str) -> Result<RoomInfo, DirectoryError> {
        self.room.clone()
    }
}

struct MockCredentials(Option<String>);

#[async_trait]
impl CredentialProvider for MockCredentials {
    async fn bearer_token(&self) -> Option<String> {
        self.0.clone()
    }
}

#[derive(Default)]
struct MockPlayback {
    device: Option<DeviceId>,
    plays: Arc<Mutex<Vec<(String, u64)>>>,
    pauses: Arc<Mutex<usize>>,
}

#[async_trait]
impl PlaybackDriver for MockPlayback {
    async fn first_available_device(&self) -> Option<DeviceId> {
        self.device.clone()
    }

    async fn play(
        &self,
        _device: &DeviceId,
        track: &str,
        offset_ms: u64,
    ) -> Result<(), PlaybackError> {
        if let Ok(mut plays) = self.plays.lock() {
            plays.push((track.to_string(), offset_ms));
        }
        Ok(())
    }

    async fn pause(&self, _device: &DeviceId) -> Result<(), PlaybackError> {
        if let Ok(mut pauses) = self.pauses.lock() {
            *pauses += 1;
        }
        Ok(())
    }
}

fn me() -> UserProfile {
    UserProfile { user_id: "me".into(), username: "me".into(), profile_name: None }
}

fn room_r1() -> RoomInfo {
    RoomInfo {
        room_id: "r1".into(),
        creator: me(),
        room_name: Some("listening party".into()),
        queue_id: None,
    }
}

type Driver = SessionDriver<MockClock, MockTransport, MockDirectory, MockCredentials, MockPlayback>;

fn driver_with(playback: MockPlayback) -> (Driver, MockClock) {
    let clock = MockClock::at(1_000_000);
    let session = Session::new(clock.clone(), SessionConfig::default());
    let driver = SessionDriver::new(
        session,
        MockTransport::default(),
        MockDirectory { profile: Ok(me()), room: Ok(room_r1()) },
        MockCredentials(Some("token".into())),
        playback,
    );
    (driver, clock)
}

fn sent_names(driver: &Driver) -> Vec<&str> {
    driver.transport().sent.iter().map(|(name, _)| name.as_str()).collect()
}

async fn join_r1(driver: &mut Driver) {
    driver.initialize().await.unwrap_or_else(|e| panic!("initialize failed: {e}"));
    driver.dispatch("connected", &json!({ "userID": "me" })).await.unwrap();

    let actions = driver.session_mut().join_room("r1").unwrap_or_else(|e| panic!("join: {e}"));
    driver.execute(actions).await.unwrap();

    driver
        .dispatch(
            "userJoinedRoom",
            &json!({
                "userID": "me",
                "body": {
                    "messageBody": "",
                    "sender": { "userID": "me", "username": "me" },
                    "roomID": "r1",
                    "dateCreated": 0,
                },
            }),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn initialization_handshakes_and_connects() {
    let (mut driver, _clock) = driver_with(MockPlayback::default());

    driver.initialize().await.unwrap_or_else(|e| panic!("initialize failed: {e}"));
    assert_eq!(driver.session().phase(), SessionPhase::Connecting);
    assert_eq!(driver.session().identity().map(|u| u.user_id.as_str()), Some("me"));
    assert!(driver.transport().open);

    driver.dispatch("connected", &json!({ "userID": "me" })).await.unwrap();
    assert_eq!(driver.session().phase(), SessionPhase::Connected);
}

#[tokio::test]
async fn missing_token_defers_initialization() {
    let clock = MockClock::at(0);
    let session = Session::new(clock, SessionConfig::default());
    let mut driver = SessionDriver::new(
        session,
        MockTransport::default(),
        MockDirectory { profile: Ok(me()), room: Ok(room_r1()) },
        MockCredentials(None),
        MockPlayback::default(),
    );

    let result = driver.initialize().await;
    assert!(matches!(result, Err(DriverError::NotReady(NotReady::MissingCredentials))));
    assert_eq!(driver.session().phase(), SessionPhase::Disconnected);
}

#[tokio::test]
async fn failed_identity_lookup_surfaces_a_notification() {
    let clock = MockClock::at(0);
    let session = Session::new(clock, SessionConfig::default());
    let mut driver = SessionDriver::new(
        session,
        MockTransport::default(),
        MockDirectory {
            profile: Err(DirectoryError::Unreachable { reason: "down".into() }),
            room: Ok(room_r1()),
        },
        MockCredentials(Some("token".into())),
        MockPlayback::default(),
    );

    driver.initialize().await.unwrap_or_else(|e| panic!("initialize failed: {e}"));
    assert_eq!(driver.session().phase(), SessionPhase::Disconnected);
    assert!(!driver.take_notifications().is_empty());
}

#[tokio::test]
async fn join_flow_reaches_joined_phase() {
    let (mut driver, _clock) = driver_with(MockPlayback::default());
    join_r1(&mut driver).await;

    assert_eq!(driver.session().phase(), SessionPhase::Joined);
    assert_eq!(
        driver.session().current_room().map(|r| r.room_id.as_str()),
        Some("r1")
    );

    let names = sent_names(&driver);
    assert!(names.contains(&"connectUser"));
    assert!(names.contains(&"joinRoom"));
    assert_eq!(names.iter().filter(|n| **n == "getLiveChatHistory").count(), 1);
}

#[tokio::test]
async fn play_media_drives_the_playback_driver_with_a_clamped_seek() {
    let plays = Arc::new(Mutex::new(Vec::new()));
    let playback = MockPlayback {
        device: Some(DeviceId("device-1".into())),
        plays: Arc::clone(&plays),
        pauses: Arc::default(),
    };
    let (mut driver, clock) = driver_with(playback);
    join_r1(&mut driver).await;

    driver
        .dispatch(
            "queueState",
            &json!({
                "room": { "roomID": "r1", "creator": { "userID": "me", "username": "me" } },
                "songs": [{
                    "spotifyID": "track-1",
                    "userID": "me",
                    "score": 0,
                    "index": 0,
                    "insertTime": 0,
                    "track": { "duration_ms": 3000 },
                }],
                "votes": [],
            }),
        )
        .await
        .unwrap();

    // Declared start 10s in the past on a 3s track: clamp to 3000.
    let start = clock.now_utc_ms() - 10_000;
    driver
        .dispatch(
            "playMedia",
            &json!({
                "userID": "me",
                "roomID": "r1",
                "spotifyID": "track-1",
                "UTC_time": start,
            }),
        )
        .await
        .unwrap();

    let recorded = plays.lock().map(|p| p.clone()).unwrap_or_default();
    assert_eq!(recorded, vec![("track-1".to_string(), 3_000)]);
}

#[tokio::test]
async fn play_without_a_device_is_reported_not_fatal() {
    let (mut driver, clock) = driver_with(MockPlayback::default());
    join_r1(&mut driver).await;

    let start = clock.now_utc_ms() - 1_000;
    driver
        .dispatch(
            "playMedia",
            &json!({
                "userID": "me",
                "roomID": "r1",
                "spotifyID": "track-1",
                "UTC_time": start,
            }),
        )
        .await
        .unwrap();

    let notifications = driver.take_notifications();
    assert!(notifications.iter().any(|n| n.contains("playback device")));
}

#[tokio::test]
async fn pause_media_pauses_when_a_device_exists() {
    let pauses = Arc::new(Mutex::new(0));
    let playback = MockPlayback {
        device: Some(DeviceId("device-1".into())),
        plays: Arc::default(),
        pauses: Arc::clone(&pauses),
    };
    let (mut driver, _clock) = driver_with(playback);
    join_r1(&mut driver).await;

    driver
        .dispatch("pauseMedia", &json!({ "userID": "me", "roomID": "r1", "spotifyID": null, "UTC_time": null }))
        .await
        .unwrap();

    assert_eq!(pauses.lock().map(|p| *p).unwrap_or_default(), 1);
}

#[tokio::test]
async fn malformed_deliveries_do_not_stall_the_stream() {
    let (mut driver, _clock) = driver_with(MockPlayback::default());
    join_r1(&mut driver).await;

    // Garbage payload, unknown event, then a valid message: the last one
    // still lands.
    driver.dispatch("directMessage", &json!({ "index": "NaN" })).await.unwrap();
    driver.dispatch("notARealEvent", &json!({})).await.unwrap();
    driver
        .dispatch(
            "liveMessage",
            &json!({
                "userID": "peer",
                "body": {
                    "messageBody": "still alive",
                    "sender": { "userID": "peer", "username": "peer" },
                    "roomID": "r1",
                    "dateCreated": 0,
                },
            }),
        )
        .await
        .unwrap();

    assert_eq!(driver.session().chat_messages().len(), 1);
}

#[tokio::test]
async fn queue_subscription_fans_out_through_the_driver() {
    let (mut driver, _clock) = driver_with(MockPlayback::default());
    join_r1(&mut driver).await;

    let (mut now_playing, actions) = driver.session_mut().fetch_queue("now-playing").unwrap();
    driver.execute(actions).await.unwrap();
    let (mut queue_page, actions) = driver.session_mut().fetch_queue("queue-page").unwrap();
    driver.execute(actions).await.unwrap();

    driver
        .dispatch(
            "queueState",
            &json!({
                "room": { "roomID": "r1", "creator": { "userID": "me", "username": "me" } },
                "songs": [{
                    "spotifyID": "track-1",
                    "userID": "me",
                    "score": 0,
                    "index": 0,
                    "insertTime": 0,
                }],
                "votes": [],
            }),
        )
        .await
        .unwrap();

    assert_eq!(now_playing.latest().map(|q| q.len()), Some(1));
    assert_eq!(queue_page.latest().map(|q| q.len()), Some(1));
}
