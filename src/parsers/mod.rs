/*
 * Parsers turn raw device output into typed neighbor data.
 * They never touch the network; the neighbor sources feed them text.
 */

pub mod cdp_detail;
pub mod hostname;
