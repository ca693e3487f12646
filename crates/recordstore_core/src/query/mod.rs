//! Query descriptor value objects passed into every fetch.

pub mod descriptor;
