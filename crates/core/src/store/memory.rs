//! In-process implementation of the shared-store contract.
//!
//! All state sits behind one async mutex, so every trait method is trivially
//! atomic. Only correct for a single process; used by tests (where
//! concurrent tasks stand in for worker processes) and by
//! `STORE_BACKEND=memory` local development.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::clip::{ClipFrame, ClipWindow, SealReason, WindowStatus};
use crate::detection::DetectionRecord;
use crate::session::{SessionStatus, StreamSession};
use crate::stats::StoreAggregate;
use crate::store::{
    ClipStore, FrameAdmission, LeaseStore, RecordOutcome, SessionStore, StopOutcome, StoreError,
    WindowOutcome,
};
use crate::types::Timestamp;

#[derive(Default)]
struct State {
    sessions: HashMap<String, StreamSession>,
    /// Oldest first.
    history: HashMap<String, VecDeque<DetectionRecord>>,
    leases: HashMap<String, Lease>,
    windows: HashMap<String, ClipWindow>,
    frames: HashMap<String, BTreeMap<u64, ClipFrame>>,
}

struct Lease {
    holder: String,
    expires_at: Instant,
}

impl State {
    fn remove_session_data(&mut self, session_id: &str) {
        self.sessions.remove(session_id);
        self.history.remove(session_id);
        let window_ids: Vec<String> = self
            .windows
            .values()
            .filter(|w| w.session_id == session_id)
            .map(|w| w.id.clone())
            .collect();
        for id in window_ids {
            self.windows.remove(&id);
            self.frames.remove(&id);
        }
    }
}

/// Shared store held in process memory.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: while unavailable every call fails with
    /// [`StoreError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory store marked unavailable".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(&self, session: &StreamSession) -> Result<bool, StoreError> {
        self.check()?;
        let mut state = self.state.lock().await;
        if let Some(existing) = state.sessions.get(&session.id) {
            if existing.is_active() {
                return Ok(false);
            }
            state.remove_session_data(&session.id);
        }
        state.sessions.insert(session.id.clone(), session.clone());
        Ok(true)
    }

    async fn get_session(&self, id: &str) -> Result<Option<StreamSession>, StoreError> {
        self.check()?;
        Ok(self.state.lock().await.sessions.get(id).cloned())
    }

    async fn admit_frame(&self, id: &str, now: Timestamp) -> Result<FrameAdmission, StoreError> {
        self.check()?;
        let mut state = self.state.lock().await;
        let Some(session) = state.sessions.get_mut(id) else {
            return Ok(FrameAdmission::NotFound);
        };
        if !session.is_active() {
            return Ok(FrameAdmission::Stopped);
        }
        session.frame_count += 1;
        session.last_activity_at = session.last_activity_at.max(now);
        Ok(FrameAdmission::Admitted(session.clone()))
    }

    async fn record_detections(
        &self,
        id: &str,
        records: &[DetectionRecord],
        history_cap: usize,
        now: Timestamp,
    ) -> Result<RecordOutcome, StoreError> {
        self.check()?;
        let mut state = self.state.lock().await;
        let Some(session) = state.sessions.get_mut(id) else {
            return Ok(RecordOutcome::NotFound);
        };
        if !session.is_active() {
            return Ok(RecordOutcome::Stopped);
        }
        session.sampled_count += 1;
        session.detection_count += records.len() as u64;
        session.last_activity_at = session.last_activity_at.max(now);
        let detection_count = session.detection_count;

        let history = state.history.entry(id.to_string()).or_default();
        history.extend(records.iter().cloned());
        while history.len() > history_cap {
            history.pop_front();
        }
        Ok(RecordOutcome::Recorded { detection_count })
    }

    async fn recent_detections(
        &self,
        id: &str,
        limit: usize,
    ) -> Result<Vec<DetectionRecord>, StoreError> {
        self.check()?;
        let state = self.state.lock().await;
        Ok(state
            .history
            .get(id)
            .map(|h| h.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn stop_session(
        &self,
        id: &str,
        now: Timestamp,
        expires_at: Timestamp,
    ) -> Result<StopOutcome, StoreError> {
        self.check()?;
        let mut state = self.state.lock().await;
        let Some(session) = state.sessions.get_mut(id) else {
            return Ok(StopOutcome::NotFound);
        };
        if !session.is_active() {
            return Ok(StopOutcome::AlreadyStopped);
        }
        session.status = SessionStatus::Stopped;
        session.stopped_at = Some(now);
        session.expires_at = Some(expires_at);
        Ok(StopOutcome::Stopped(session.clone()))
    }

    async fn idle_sessions(&self, cutoff: Timestamp) -> Result<Vec<String>, StoreError> {
        self.check()?;
        let state = self.state.lock().await;
        let mut ids: Vec<String> = state
            .sessions
            .values()
            .filter(|s| s.is_active() && s.last_activity_at < cutoff)
            .map(|s| s.id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn purge_expired(&self, now: Timestamp) -> Result<u64, StoreError> {
        self.check()?;
        let mut state = self.state.lock().await;
        let expired: Vec<String> = state
            .sessions
            .values()
            .filter(|s| !s.is_active() && s.expires_at.is_some_and(|at| at <= now))
            .map(|s| s.id.clone())
            .collect();
        for id in &expired {
            state.remove_session_data(id);
        }
        Ok(expired.len() as u64)
    }

    async fn aggregate(&self) -> Result<StoreAggregate, StoreError> {
        self.check()?;
        let state = self.state.lock().await;
        let mut agg = StoreAggregate::default();
        for s in state.sessions.values() {
            match s.status {
                SessionStatus::Active => agg.active_sessions += 1,
                SessionStatus::Stopped => agg.stopped_sessions += 1,
            }
            agg.total_frames += s.frame_count;
            agg.total_sampled_frames += s.sampled_count;
            agg.total_detections += s.detection_count;
        }
        for w in state.windows.values() {
            match w.status {
                WindowStatus::Recording => agg.recording_windows += 1,
                WindowStatus::Flushing => agg.flushing_windows += 1,
                WindowStatus::Uploaded => agg.clips_uploaded += 1,
                WindowStatus::Discarded => agg.clips_discarded += 1,
            }
        }
        Ok(agg)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check()
    }
}

#[async_trait]
impl LeaseStore for MemoryStore {
    async fn try_acquire(
        &self,
        key: &str,
        holder: &str,
        lease: Duration,
    ) -> Result<bool, StoreError> {
        self.check()?;
        let mut state = self.state.lock().await;
        let now = Instant::now();
        if let Some(existing) = state.leases.get(key) {
            if existing.expires_at > now {
                return Ok(false);
            }
        }
        state.leases.insert(
            key.to_string(),
            Lease {
                holder: holder.to_string(),
                expires_at: now + lease,
            },
        );
        Ok(true)
    }

    async fn release(&self, key: &str, holder: &str) -> Result<bool, StoreError> {
        self.check()?;
        let mut state = self.state.lock().await;
        match state.leases.get(key) {
            Some(lease) if lease.holder == holder => {
                state.leases.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl ClipStore for MemoryStore {
    async fn recording_window(&self, session_id: &str) -> Result<Option<ClipWindow>, StoreError> {
        self.check()?;
        let state = self.state.lock().await;
        Ok(state
            .windows
            .values()
            .find(|w| w.session_id == session_id && w.status == WindowStatus::Recording)
            .cloned())
    }

    async fn open_window(&self, window: &ClipWindow) -> Result<bool, StoreError> {
        self.check()?;
        let mut state = self.state.lock().await;
        let taken = state
            .windows
            .values()
            .any(|w| w.session_id == window.session_id && w.status == WindowStatus::Recording);
        if taken || state.windows.contains_key(&window.id) {
            return Ok(false);
        }
        state.windows.insert(window.id.clone(), window.clone());
        state.frames.insert(window.id.clone(), BTreeMap::new());
        Ok(true)
    }

    async fn append_frame(
        &self,
        window_id: &str,
        frame: &ClipFrame,
        detection_at: Option<Timestamp>,
    ) -> Result<Option<u32>, StoreError> {
        self.check()?;
        let mut state = self.state.lock().await;
        let State {
            windows, frames, ..
        } = &mut *state;
        let Some(window) = windows.get_mut(window_id) else {
            return Ok(None);
        };
        if window.status != WindowStatus::Recording {
            return Ok(None);
        }
        let buffer = frames.entry(window_id.to_string()).or_default();
        if !buffer.contains_key(&frame.frame_index) {
            buffer.insert(frame.frame_index, frame.clone());
            window.frame_count += 1;
        }
        if let Some(at) = detection_at {
            window.last_detection_at = window.last_detection_at.max(at);
        }
        Ok(Some(window.frame_count))
    }

    async fn seal_window(
        &self,
        window_id: &str,
        reason: SealReason,
        now: Timestamp,
    ) -> Result<Option<ClipWindow>, StoreError> {
        self.check()?;
        let mut state = self.state.lock().await;
        let Some(window) = state.windows.get_mut(window_id) else {
            return Ok(None);
        };
        if window.status != WindowStatus::Recording {
            return Ok(None);
        }
        window.status = WindowStatus::Flushing;
        window.sealed_at = Some(now);
        window.seal_reason = Some(reason);
        Ok(Some(window.clone()))
    }

    async fn window_frames(&self, window_id: &str) -> Result<Vec<ClipFrame>, StoreError> {
        self.check()?;
        let state = self.state.lock().await;
        Ok(state
            .frames
            .get(window_id)
            .map(|b| b.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn finish_window(
        &self,
        window_id: &str,
        outcome: &WindowOutcome,
        _now: Timestamp,
    ) -> Result<(), StoreError> {
        self.check()?;
        let mut state = self.state.lock().await;
        if let Some(window) = state.windows.get_mut(window_id) {
            if window.status == WindowStatus::Flushing {
                match outcome {
                    WindowOutcome::Uploaded { object_key } => {
                        window.status = WindowStatus::Uploaded;
                        window.object_key = Some(object_key.clone());
                    }
                    WindowOutcome::Discarded => window.status = WindowStatus::Discarded,
                }
            }
        }
        state.frames.remove(window_id);
        Ok(())
    }

    async fn recording_windows(&self) -> Result<Vec<ClipWindow>, StoreError> {
        self.check()?;
        let state = self.state.lock().await;
        Ok(state
            .windows
            .values()
            .filter(|w| w.status == WindowStatus::Recording)
            .cloned()
            .collect())
    }

    async fn stale_flushing_windows(
        &self,
        sealed_before: Timestamp,
    ) -> Result<Vec<ClipWindow>, StoreError> {
        self.check()?;
        let state = self.state.lock().await;
        Ok(state
            .windows
            .values()
            .filter(|w| {
                w.status == WindowStatus::Flushing
                    && w.sealed_at.is_some_and(|at| at < sealed_before)
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{BoundingBox, DetectionResult};
    use crate::session::SessionConfig;
    use assert_matches::assert_matches;
    use chrono::Utc;

    fn session(id: &str) -> StreamSession {
        StreamSession::new(id.to_string(), SessionConfig::default(), Utc::now())
    }

    fn record(frame_index: u64) -> DetectionRecord {
        DetectionRecord {
            frame_index,
            detection: DetectionResult::new(
                "person",
                0.9,
                BoundingBox {
                    x1: 1.0,
                    y1: 2.0,
                    x2: 3.0,
                    y2: 4.0,
                },
            ),
            recorded_at: Utc::now(),
        }
    }

    fn clip_frame(index: u64) -> ClipFrame {
        ClipFrame {
            frame_index: index,
            captured_at: Utc::now(),
            content_type: "image/png".into(),
            payload: vec![index as u8],
        }
    }

    #[tokio::test]
    async fn create_collides_only_with_active_sessions() {
        let store = MemoryStore::new();
        assert!(store.create_session(&session("a")).await.unwrap());
        assert!(!store.create_session(&session("a")).await.unwrap());

        let now = Utc::now();
        store.stop_session("a", now, now).await.unwrap();
        assert!(store.create_session(&session("a")).await.unwrap());
    }

    #[tokio::test]
    async fn history_is_capped_newest_first() {
        let store = MemoryStore::new();
        store.create_session(&session("a")).await.unwrap();
        for i in 0..5 {
            store
                .record_detections("a", &[record(i)], 3, Utc::now())
                .await
                .unwrap();
        }
        let recent = store.recent_detections("a", 10).await.unwrap();
        let indices: Vec<u64> = recent.iter().map(|r| r.frame_index).collect();
        assert_eq!(indices, vec![4, 3, 2]);

        let s = store.get_session("a").await.unwrap().unwrap();
        assert_eq!(s.detection_count, 5);
        assert_eq!(s.sampled_count, 5);
    }

    #[tokio::test]
    async fn stopped_sessions_reject_frames_and_detections() {
        let store = MemoryStore::new();
        store.create_session(&session("a")).await.unwrap();
        let now = Utc::now();
        assert_matches!(
            store.stop_session("a", now, now).await.unwrap(),
            StopOutcome::Stopped(_)
        );
        assert_eq!(
            store.stop_session("a", now, now).await.unwrap(),
            StopOutcome::AlreadyStopped
        );
        assert_eq!(
            store.admit_frame("a", now).await.unwrap(),
            FrameAdmission::Stopped
        );
        assert_eq!(
            store.record_detections("a", &[], 10, now).await.unwrap(),
            RecordOutcome::Stopped
        );
        assert_eq!(
            store.admit_frame("missing", now).await.unwrap(),
            FrameAdmission::NotFound
        );
    }

    #[tokio::test(start_paused = true)]
    async fn lease_is_exclusive_until_expiry() {
        let store = MemoryStore::new();
        let lease = Duration::from_secs(10);
        assert!(store.try_acquire("k", "p1", lease).await.unwrap());
        assert!(!store.try_acquire("k", "p2", lease).await.unwrap());
        assert!(!store.release("k", "p2").await.unwrap());

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(store.try_acquire("k", "p2", lease).await.unwrap());
        // The expired holder cannot release the new holder's lease.
        assert!(!store.release("k", "p1").await.unwrap());
        assert!(store.release("k", "p2").await.unwrap());
    }

    #[tokio::test]
    async fn one_recording_window_per_session() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let first = ClipWindow::open("a", now);
        let second = ClipWindow::open("a", now);
        assert!(store.open_window(&first).await.unwrap());
        assert!(!store.open_window(&second).await.unwrap());

        store
            .seal_window(&first.id, SealReason::QuietPeriod, now)
            .await
            .unwrap();
        assert!(store.open_window(&second).await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_frame_index_appended_once() {
        let store = MemoryStore::new();
        let window = ClipWindow::open("a", Utc::now());
        store.open_window(&window).await.unwrap();
        assert_eq!(
            store.append_frame(&window.id, &clip_frame(1), None).await.unwrap(),
            Some(1)
        );
        assert_eq!(
            store.append_frame(&window.id, &clip_frame(1), None).await.unwrap(),
            Some(1)
        );
        assert_eq!(
            store.append_frame(&window.id, &clip_frame(2), None).await.unwrap(),
            Some(2)
        );
    }

    #[tokio::test]
    async fn sealed_windows_accept_no_frames_and_seal_once() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let window = ClipWindow::open("a", now);
        store.open_window(&window).await.unwrap();
        assert!(store
            .seal_window(&window.id, SealReason::MaxFrames, now)
            .await
            .unwrap()
            .is_some());
        assert!(store
            .seal_window(&window.id, SealReason::MaxFrames, now)
            .await
            .unwrap()
            .is_none());
        assert_eq!(
            store.append_frame(&window.id, &clip_frame(1), None).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn purge_removes_expired_stopped_sessions_with_their_windows() {
        let store = MemoryStore::new();
        store.create_session(&session("a")).await.unwrap();
        store.create_session(&session("b")).await.unwrap();
        let now = Utc::now();
        store.open_window(&ClipWindow::open("a", now)).await.unwrap();
        store.stop_session("a", now, now).await.unwrap();

        assert_eq!(store.purge_expired(now).await.unwrap(), 1);
        assert!(store.get_session("a").await.unwrap().is_none());
        assert!(store.get_session("b").await.unwrap().is_some());
        assert!(store.recording_windows().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_call() {
        let store = MemoryStore::new();
        store.set_available(false);
        assert_matches!(store.ping().await, Err(StoreError::Unavailable(_)));
        assert_matches!(store.aggregate().await, Err(StoreError::Unavailable(_)));
        store.set_available(true);
        assert!(store.ping().await.is_ok());
    }
}
