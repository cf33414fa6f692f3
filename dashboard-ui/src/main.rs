//! Referral Dashboard
//!
//! Live referral earnings dashboard built with Leptos (WASM).
//!
//! # Features
//!
//! - Earnings, clicks, referrals and offers for the signed-in user
//! - Live refresh on earnings table changes
//! - Copy the referral link, share on social networks
//!
//! # Architecture
//!
//! Client-side rendered (CSR) Leptos application compiled to WebAssembly.
//! It queries the backend over HTTP and follows table changes over its
//! realtime websocket.

use leptos::*;

mod api;
mod app;
mod components;
mod pages;
mod state;
mod stats;

fn main() {
    // Set up panic hook for better error messages in WASM
    console_error_panic_hook::set_once();

    mount_to_body(|| view! { <app::App /> });
}
