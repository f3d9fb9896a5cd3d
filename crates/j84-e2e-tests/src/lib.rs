//! End-to-end tests for the J1939-84 harness live under `tests/`.
