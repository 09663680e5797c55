pub mod sweep_actor;
