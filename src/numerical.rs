/// # Optimal control by direct multiple shooting
///```rust, ignore
/// use RustedOCP::numerical::optimal_control::ocp_api::DirectMultipleShooting;
/// use RustedOCP::numerical::optimal_control::ocp_model::OcpModel;
/// use RustedOCP::numerical::optimal_control::shooting_transcriber::ShootingConfig;
/// // minimize ∫ x^2 + u^2 dt, dx/dt = -x + u, x(0) = 1
/// let model = OcpModel::from_strings(&["x"], &["u"], &["-x+u"], "x^2+u^2", &["x-1"]).unwrap();
/// let mut ocp = DirectMultipleShooting::new(model, ShootingConfig::new(1.0, 10, 4));
/// let outcome = ocp.solve().unwrap();
/// println!("x = {:?}", outcome.solution().state("x"));
///```
pub mod optimal_control;
