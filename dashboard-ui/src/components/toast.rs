//! Toast Notification Component
//!
//! Shows the current toast, if any.

use leptos::*;

use crate::state::global::{GlobalState, ToastVariant};

/// Toast notification container
#[component]
pub fn Toast() -> impl IntoView {
    let state = use_context::<GlobalState>().expect("GlobalState not found");

    view! {
        <div class="fixed bottom-20 right-4 z-50 space-y-2">
            {move || {
                state.toast.get().map(|toast| {
                    let (icon, bg_class) = match toast.variant {
                        ToastVariant::Success => ("✓", "bg-green-600"),
                        ToastVariant::Error => ("✕", "bg-red-600"),
                    };

                    view! {
                        <div class=format!(
                            "flex items-start space-x-3 {} text-white px-4 py-3 rounded-lg shadow-lg \
                             transform transition-all duration-300 ease-out animate-slide-in",
                            bg_class
                        )>
                            <span class="text-lg">{icon}</span>
                            <div>
                                <div class="text-sm font-semibold">{toast.title}</div>
                                <div class="text-sm">{toast.description}</div>
                            </div>
                        </div>
                    }
                })
            }}
        </div>
    }
}
