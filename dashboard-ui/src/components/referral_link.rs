//! Referral Link Component
//!
//! Shows the referral link with a copy button.

use leptos::*;

use crate::state::global::GlobalState;

#[component]
pub fn ReferralLinkCard() -> impl IntoView {
    let state = use_context::<GlobalState>().expect("GlobalState not found");
    let link = state.settings.with_value(|s| s.referral_link.clone());

    let link_for_copy = link.clone();
    let on_copy = move |_| {
        let state = state.clone();
        let link = link_for_copy.clone();
        spawn_local(async move {
            match copy_to_clipboard(&link).await {
                Ok(()) => state.show_success(
                    "Link copied!",
                    "Your referral link has been copied to clipboard.",
                ),
                Err(e) => {
                    web_sys::console::error_1(&format!("Clipboard write failed: {}", e).into());
                    state.show_error("Copy failed", &e);
                }
            }
        });
    };

    view! {
        <div class="bg-gray-800 rounded-lg p-6 border border-gray-700">
            <h2 class="text-lg font-semibold mb-4">"Copy Your Referral Link 👇"</h2>
            <div class="flex items-center space-x-3">
                <input
                    type="text"
                    readonly=true
                    value=link
                    class="flex-1 bg-gray-900 border border-gray-700 rounded-lg px-4 py-2 text-gray-200"
                />
                <button
                    on:click=on_copy
                    class="px-4 py-2 bg-primary-600 hover:bg-primary-700 rounded-lg font-medium transition-colors"
                >
                    "Copy"
                </button>
            </div>
        </div>
    }
}

/// Write text through the async clipboard API
async fn copy_to_clipboard(text: &str) -> Result<(), String> {
    let window = web_sys::window().ok_or("No window")?;
    let promise = window.navigator().clipboard().write_text(text);
    wasm_bindgen_futures::JsFuture::from(promise)
        .await
        .map(|_| ())
        .map_err(|e| format!("{:?}", e))
}
