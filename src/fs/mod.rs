mod single_file;

pub use single_file::SingleFile;
