//! Share Buttons Component

use leptos::*;

/// Label and URL per social network
pub const SHARE_TARGETS: [(&str, &str); 3] = [
    ("Facebook", "https://facebook.com"),
    ("Twitter", "https://twitter.com"),
    ("Instagram", "https://instagram.com"),
];

#[component]
pub fn ShareButtons() -> impl IntoView {
    view! {
        <div class="bg-gray-800 rounded-lg p-6 border border-gray-700">
            <h2 class="text-lg font-semibold mb-4">"Share on Social Media"</h2>
            <div class="flex flex-wrap gap-3">
                {SHARE_TARGETS
                    .iter()
                    .map(|&(name, url)| view! {
                        <button
                            on:click=move |_| open_in_new_tab(url)
                            class="px-4 py-2 bg-gray-700 hover:bg-gray-600 rounded-lg transition-colors"
                        >
                            {format!("Share on {}", name)}
                        </button>
                    })
                    .collect_view()}
            </div>
        </div>
    }
}

fn open_in_new_tab(url: &str) {
    let Some(window) = web_sys::window() else {
        return;
    };
    if let Err(e) = window.open_with_url_and_target(url, "_blank") {
        web_sys::console::error_1(&format!("Failed to open {}: {:?}", url, e).into());
    }
}
