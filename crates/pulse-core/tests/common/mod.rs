pub mod fake_bulb;
