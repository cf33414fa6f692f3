//! Stat Card Components
//!
//! Cards for the earnings total and the referral counters.

use leptos::*;

/// Total earnings with the clicks sentence underneath
#[component]
pub fn EarningsCard(
    #[prop(into)]
    earnings: String,
    #[prop(into)]
    clicks: String,
) -> impl IntoView {
    view! {
        <div class="bg-gradient-to-br from-primary-600 to-primary-800 rounded-lg p-6 border border-primary-500">
            <span class="text-primary-100 text-sm">"Total Earnings"</span>
            <div class="text-4xl font-bold mt-2">{earnings}</div>
            <div class="text-primary-100 mt-2">{clicks}</div>
        </div>
    }
}

/// A single labelled counter
#[component]
pub fn StatCard(
    label: &'static str,
    #[prop(into)]
    value: String,
    #[prop(optional)]
    icon: Option<&'static str>,
) -> impl IntoView {
    view! {
        <div class="bg-gray-800 rounded-lg p-4 border border-gray-700 hover:border-gray-600 transition">
            <div class="flex items-center justify-between">
                <span class="text-gray-400 text-sm">{label}</span>
                {icon.map(|i| view! { <span class="text-xl">{i}</span> })}
            </div>
            <div class="text-3xl font-bold mt-2">{value}</div>
        </div>
    }
}
