/// MPEG transport stream demuxing and synthesis
pub mod ts;
