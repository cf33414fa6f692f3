//! Sidebar Component
//!
//! Brand and navigation links.

use leptos::*;
use leptos_router::*;

#[component]
pub fn Sidebar() -> impl IntoView {
    view! {
        <aside class="w-60 bg-gray-800 border-r border-gray-700 hidden md:flex flex-col">
            <A href="/" class="flex items-center space-x-3 h-16 px-6">
                <span class="text-2xl">"💸"</span>
                <span class="text-xl font-bold text-white">"ReferralPro"</span>
            </A>

            <nav class="flex flex-col space-y-1 px-3 py-4">
                <SidebarLink href="/" label="Dashboard" />
            </nav>
        </aside>
    }
}

#[component]
fn SidebarLink(
    href: &'static str,
    label: &'static str,
) -> impl IntoView {
    view! {
        <A
            href=href
            class="px-4 py-2 rounded-lg text-gray-300 hover:text-white hover:bg-gray-700 transition-colors"
            active_class="bg-gray-700 text-white"
        >
            {label}
        </A>
    }
}
