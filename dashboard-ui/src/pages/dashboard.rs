//! Dashboard Page
//!
//! Earnings, counters, referral link and share buttons. Stats are fetched on
//! mount and refetched on every earnings change while the page is shown.

use leptos::*;

use crate::components::{EarningsCard, Loading, ReferralLinkCard, ShareButtons, StatCard};
use crate::state::global::GlobalState;
use crate::state::realtime::{ChannelConfig, RealtimeChannel};
use crate::stats::Screen;

/// Dashboard page component
#[component]
pub fn Dashboard() -> impl IntoView {
    let state = use_context::<GlobalState>().expect("GlobalState not found");

    // Fetch once, then follow table changes until the page goes away
    state.refetch();
    let channel = RealtimeChannel::subscribe(state.clone(), ChannelConfig::default());
    let live = state.live;
    on_cleanup(move || {
        channel.close();
        live.set(false);
    });

    let screen = create_memo(move |_| {
        let stats = state.stats.get();
        let failure = state.failure.get();
        Screen::select(stats.as_ref(), failure.as_ref())
    });

    view! {
        <div class="space-y-8">
            <div>
                <h1 class="text-3xl font-bold">"Dashboard"</h1>
            </div>

            {move || match screen.get() {
                Screen::Loading => view! { <Loading /> }.into_view(),
                Screen::SignInRequired => view! {
                    <div class="bg-gray-800 rounded-lg p-6 border border-gray-700 text-center">
                        <h2 class="text-xl font-semibold mb-2">"Not authenticated"</h2>
                        <p class="text-gray-400">"Sign in to see your referral stats."</p>
                    </div>
                }.into_view(),
                Screen::Error(message) => view! {
                    <div class="bg-red-900/40 rounded-lg p-6 border border-red-700">
                        <h2 class="text-xl font-semibold mb-2">"Something went wrong"</h2>
                        <p class="text-red-200">{message}</p>
                    </div>
                }.into_view(),
                Screen::Dashboard(display) => view! {
                    <div class="grid grid-cols-1 md:grid-cols-3 gap-4">
                        <EarningsCard earnings=display.earnings clicks=display.clicks />
                        <StatCard label="Referrals" value=display.referrals icon="👥" />
                        <StatCard label="Offers" value=display.offers icon="🎁" />
                    </div>
                    <ReferralLinkCard />
                    <ShareButtons />
                }.into_view(),
            }}
        </div>
    }
}
