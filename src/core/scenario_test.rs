#[cfg(test)]
mod scenario_tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use crate::core::config::Settings;
    use crate::core::controller::AlertController;
    use crate::core::model::{
        AlertPayload, AlertState, AudioHandle, CapturePhase, CaptureState, Coordinates,
        DispatchState,
    };
    use crate::core::providers::{
        AlertDispatcher, AudioCaptureProvider, CaptureError, DispatchError, LocationProvider,
    };

    struct CountingLocation {
        calls: AtomicUsize,
        gate: Option<Arc<Notify>>,
        result: Result<Coordinates, CaptureError>,
    }

    #[async_trait]
    impl LocationProvider for CountingLocation {
        async fn acquire(&self) -> Result<Coordinates, CaptureError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.result
        }
    }

    struct CountingAudio {
        calls: AtomicUsize,
        result: Result<AudioHandle, CaptureError>,
    }

    #[async_trait]
    impl AudioCaptureProvider for CountingAudio {
        async fn record(&self, _duration: Duration) -> Result<AudioHandle, CaptureError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    struct CountingDispatcher {
        calls: AtomicUsize,
        last_payload: Mutex<Option<AlertPayload>>,
    }

    #[async_trait]
    impl AlertDispatcher for CountingDispatcher {
        async fn send(&self, payload: AlertPayload) -> Result<(), DispatchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_payload.lock().unwrap() = Some(payload);
            Ok(())
        }
    }

    fn dispatcher() -> Arc<CountingDispatcher> {
        Arc::new(CountingDispatcher {
            calls: AtomicUsize::new(0),
            last_payload: Mutex::new(None),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn scenario_full_escalation_with_enrichments() {
        let location = Arc::new(CountingLocation {
            calls: AtomicUsize::new(0),
            gate: None,
            result: Ok(Coordinates { lat: 1.0, lon: 2.0 }),
        });
        let audio = Arc::new(CountingAudio {
            calls: AtomicUsize::new(0),
            result: Err(CaptureError::Timeout),
        });
        let sent = dispatcher();
        let controller = AlertController::spawn(
            Settings::default(),
            location.clone(),
            audio.clone(),
            sent.clone(),
        );
        let mut rx = controller.subscribe();

        let id = controller.open().await.unwrap();
        rx.wait_for(|s| s.state == AlertState::Dispatched)
            .await
            .unwrap();

        // Dispatched exactly once, with a payload stamped for this session
        rx.wait_for(|s| s.dispatch == DispatchState::Sent)
            .await
            .unwrap();
        assert_eq!(sent.calls.load(Ordering::SeqCst), 1);
        let payload = sent.last_payload.lock().unwrap().clone().unwrap();
        assert_eq!(payload.session_id, id);

        // Location and audio settle independently; the audio timeout must
        // leave the location capture untouched
        assert_eq!(
            controller.request_location().await,
            Ok(CapturePhase::InProgress)
        );
        assert_eq!(
            controller.request_audio(Duration::from_secs(10)).await,
            Ok(CapturePhase::InProgress)
        );

        rx.wait_for(|s| {
            s.enrichments.location.phase() == CapturePhase::Succeeded
                && s.enrichments.audio.phase() == CapturePhase::Failed
        })
        .await
        .unwrap();

        let snapshot = controller.snapshot();
        assert_eq!(
            snapshot.enrichments.location,
            CaptureState::Succeeded(Coordinates { lat: 1.0, lon: 2.0 })
        );
        assert_eq!(
            snapshot.enrichments.audio,
            CaptureState::Failed(CaptureError::Timeout)
        );

        controller.set_message("Please call authorities for me.").await.unwrap();
        assert_eq!(
            controller.snapshot().enrichments.message,
            CaptureState::Succeeded("Please call authorities for me.".to_string())
        );

        // Close discards the session and every capture record
        controller.close().await.unwrap();
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.state, AlertState::Idle);
        assert_eq!(snapshot.enrichments.location, CaptureState::NotStarted);
        assert_eq!(snapshot.enrichments.audio, CaptureState::NotStarted);
        assert_eq!(snapshot.enrichments.message, CaptureState::NotStarted);

        // Still exactly one dispatch for the whole session
        assert_eq!(sent.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn scenario_safe_word_cancels_discreetly() {
        let location = Arc::new(CountingLocation {
            calls: AtomicUsize::new(0),
            gate: None,
            result: Ok(Coordinates { lat: 0.0, lon: 0.0 }),
        });
        let audio = Arc::new(CountingAudio {
            calls: AtomicUsize::new(0),
            result: Ok(AudioHandle("snippet-1".to_string())),
        });
        let sent = dispatcher();
        let controller =
            AlertController::spawn(Settings::default(), location, audio, sent.clone());
        let mut rx = controller.subscribe();

        controller.open().await.unwrap();
        rx.wait_for(|s| s.remaining_ticks == 3).await.unwrap();

        assert_eq!(controller.submit_safe_word("ubuntu").await, Ok(true));
        assert_eq!(controller.snapshot().state, AlertState::Cancelled);

        // Even well past the original deadline, nothing dispatches
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(sent.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn scenario_late_results_for_closed_session_dropped() {
        let gate = Arc::new(Notify::new());
        let location = Arc::new(CountingLocation {
            calls: AtomicUsize::new(0),
            gate: Some(gate.clone()),
            result: Ok(Coordinates { lat: 9.0, lon: 9.0 }),
        });
        let audio = Arc::new(CountingAudio {
            calls: AtomicUsize::new(0),
            result: Ok(AudioHandle("snippet-1".to_string())),
        });
        let controller = AlertController::spawn(
            Settings::default(),
            location.clone(),
            audio,
            dispatcher(),
        );
        let mut rx = controller.subscribe();

        controller.open().await.unwrap();
        rx.wait_for(|s| s.state == AlertState::Dispatched)
            .await
            .unwrap();

        controller.request_location().await.unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(location.calls.load(Ordering::SeqCst), 1);

        // Tear down with the capture still in flight, then start over
        controller.close().await.unwrap();
        controller.open().await.unwrap();

        // The old capture settles now; its session is gone
        gate.notify_one();
        tokio::time::sleep(Duration::from_millis(1)).await;

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.state, AlertState::Armed);
        assert_eq!(snapshot.enrichments.location, CaptureState::NotStarted);

        // The new session still captures normally
        rx.wait_for(|s| s.state == AlertState::Dispatched)
            .await
            .unwrap();
        assert_eq!(controller.snapshot().enrichments.location, CaptureState::NotStarted);

        controller.request_location().await.unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(location.calls.load(Ordering::SeqCst), 2);

        gate.notify_one();
        rx.wait_for(|s| {
            s.enrichments.location == CaptureState::Succeeded(Coordinates { lat: 9.0, lon: 9.0 })
        })
        .await
        .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn scenario_duplicate_requests_share_one_provider_call() {
        let gate = Arc::new(Notify::new());
        let location = Arc::new(CountingLocation {
            calls: AtomicUsize::new(0),
            gate: Some(gate.clone()),
            result: Ok(Coordinates { lat: 1.0, lon: 2.0 }),
        });
        let audio = Arc::new(CountingAudio {
            calls: AtomicUsize::new(0),
            result: Ok(AudioHandle("snippet-1".to_string())),
        });
        let controller = AlertController::spawn(
            Settings::default(),
            location.clone(),
            audio,
            dispatcher(),
        );
        let mut rx = controller.subscribe();

        controller.open().await.unwrap();
        rx.wait_for(|s| s.state == AlertState::Dispatched)
            .await
            .unwrap();

        assert_eq!(
            controller.request_location().await,
            Ok(CapturePhase::InProgress)
        );
        assert_eq!(
            controller.request_location().await,
            Ok(CapturePhase::InProgress)
        );

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(location.calls.load(Ordering::SeqCst), 1);

        gate.notify_one();
        rx.wait_for(|s| s.enrichments.location.phase() == CapturePhase::Succeeded)
            .await
            .unwrap();
        assert_eq!(location.calls.load(Ordering::SeqCst), 1);
    }
}
