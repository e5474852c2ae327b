/*
 * This module provides data aquisition abilites for the crawler.
 * It doesn't care what it gets, just how: SSH command sessions and SNMP sessions,
 * each behind a small connector trait so neighbor sources can be driven by fakes.
 */

pub mod core;
pub mod snmp;
pub mod ssh;
