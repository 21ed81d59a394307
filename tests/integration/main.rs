//! End-to-end tests over the engine, stores, payment intake and router,
//! with deterministic in-memory doubles for the outside world.

mod doubles;
mod game_flow;
mod payment_flow;
