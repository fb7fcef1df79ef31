pub mod combine;
pub mod first_hit;
pub mod motif_input;
pub mod pr_curve;
pub mod rank;
pub mod reduce;
pub mod run;
pub mod status;
pub mod summary;
pub mod triplet_io;
