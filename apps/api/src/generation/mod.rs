// Plan generation: prompt assembly, input sanitizing, the idempotent
// generate-and-commit flow, read endpoints and the stale-generation sweep.
// All inference calls go through llm_client.

pub mod generator;
pub mod handlers;
pub mod prompts;
pub mod sanitizer;
pub mod watchdog;
