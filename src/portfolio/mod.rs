pub mod assumptions;
pub mod comm;
pub mod learnts;
pub mod master;
pub mod occurs;
pub mod stats;
pub mod worker;
