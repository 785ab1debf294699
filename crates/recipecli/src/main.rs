//! Lists recipes together with their photos.
//!
//! The recipe list is fetched first. Then the photo of every recipe is loaded concurrently
//! through the image loader, one requester per row, just like a scrolling list would.

mod cli;
mod output;
mod photos;
mod settings;

use imageloader_service::logging;

fn main() {
    match cli::execute() {
        Ok(()) => std::process::exit(0),
        Err(error) => {
            logging::ensure_log_error(&error);
            std::process::exit(1);
        }
    }
}
