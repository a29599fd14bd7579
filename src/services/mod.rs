pub mod mentions;
pub mod spikes;
