pub mod url_parser;

pub use url_parser::{parse_url_list, validate_url};
