use imageloader_service::StandardImageLoader;
use imageloader_service::config::Config;
use imageloader_test as test;

pub use test::HitCounter;

/// Setup tests and create a loader fetching over HTTP.
///
/// The `update_config` closure can modify any default configuration if needed before the
/// loader is created.
pub fn setup_loader(update_config: impl FnOnce(&mut Config)) -> StandardImageLoader {
    test::setup();

    let mut config = Config::default();
    update_config(&mut config);

    StandardImageLoader::from_config(&config).unwrap()
}
