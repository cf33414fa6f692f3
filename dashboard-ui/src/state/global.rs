//! Global Application State
//!
//! Reactive state management using Leptos signals.

use leptos::*;

use crate::api::{self, BackendSettings};
use crate::stats::{LoadFailure, RequestSequence, UserStats};

/// Global application state provided to all components
#[derive(Clone)]
pub struct GlobalState {
    /// Backend connection settings
    pub settings: StoredValue<BackendSettings>,
    /// Last successfully fetched stats; kept while a refetch is running
    pub stats: RwSignal<Option<UserStats>>,
    /// A fetch is in flight
    pub loading: RwSignal<bool>,
    /// Failure of the latest completed fetch
    pub failure: RwSignal<Option<LoadFailure>>,
    /// Realtime channel joined
    pub live: RwSignal<bool>,
    /// Last successful fetch timestamp
    pub last_sync: RwSignal<Option<i64>>,
    /// Toast on screen
    pub toast: RwSignal<Option<Toast>>,
    sequence: StoredValue<RequestSequence>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ToastVariant {
    Success,
    Error,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Toast {
    pub title: String,
    pub description: String,
    pub variant: ToastVariant,
}

/// Provide global state to the component tree
pub fn provide_global_state() {
    let state = GlobalState {
        settings: store_value(api::get_settings()),
        stats: create_rw_signal(None),
        loading: create_rw_signal(false),
        failure: create_rw_signal(None),
        live: create_rw_signal(false),
        last_sync: create_rw_signal(None),
        toast: create_rw_signal(None),
        sequence: store_value(RequestSequence::default()),
    };

    provide_context(state);
}

impl GlobalState {
    /// Fetch stats for the signed-in user.
    ///
    /// Each call gets a sequence number; a response is applied only if no
    /// newer fetch was issued meanwhile.
    pub fn refetch(&self) {
        let mut sequence = 0;
        self.sequence.update_value(|s| sequence = s.issue());
        self.loading.set(true);

        let state = self.clone();
        let settings = self.settings.get_value();
        spawn_local(async move {
            let result = api::load_user_stats(&settings).await;
            state.complete(sequence, result);
        });
    }

    fn complete(&self, sequence: u64, result: Result<UserStats, LoadFailure>) {
        if !self.sequence.with_value(|s| s.is_latest(sequence)) {
            web_sys::console::log_1(&format!("Discarding stale stats response #{}", sequence).into());
            return;
        }

        self.loading.set(false);
        match result {
            Ok(stats) => {
                self.stats.set(Some(stats));
                self.failure.set(None);
                self.last_sync.set(Some(chrono::Utc::now().timestamp_millis()));
            }
            Err(failure) => {
                if let LoadFailure::Fetch(message) = &failure {
                    web_sys::console::error_1(&format!("Failed to load stats: {}", message).into());
                }
                self.failure.set(Some(failure));
            }
        }
    }

    /// Show a success toast (auto-clears after timeout)
    pub fn show_success(&self, title: &str, description: &str) {
        self.show_toast(
            Toast {
                title: title.to_string(),
                description: description.to_string(),
                variant: ToastVariant::Success,
            },
            3000,
        );
    }

    /// Show an error toast (auto-clears after timeout)
    pub fn show_error(&self, title: &str, description: &str) {
        self.show_toast(
            Toast {
                title: title.to_string(),
                description: description.to_string(),
                variant: ToastVariant::Error,
            },
            5000,
        );
    }

    fn show_toast(&self, toast: Toast, millis: u32) {
        self.toast.set(Some(toast.clone()));

        let toast_signal = self.toast;
        gloo_timers::callback::Timeout::new(millis, move || {
            // A newer toast keeps its own timer
            if toast_signal.get_untracked().as_ref() == Some(&toast) {
                toast_signal.set(None);
            }
        })
        .forget();
    }
}
