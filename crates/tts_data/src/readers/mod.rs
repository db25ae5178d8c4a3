pub mod jsonl;
pub mod safetensors;
pub mod wav;

pub use jsonl::JsonlSource;
pub use self::safetensors::SafetensorsSource;
pub use wav::{load_cut_audio, read_wav_segment};
