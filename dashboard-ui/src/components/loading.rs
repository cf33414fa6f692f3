//! Loading Component

use leptos::*;

/// Full-page loading placeholder
#[component]
pub fn Loading() -> impl IntoView {
    view! {
        <div class="flex items-center justify-center space-x-3 py-12 text-gray-400">
            <div class="loading-spinner w-8 h-8" />
            <span>"Loading..."</span>
        </div>
    }
}
