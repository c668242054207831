use argh::FromArgs;
use viewscore::quality::{
    config::PipelineConfig,
    pipeline::{run_pipeline, ScenePaths},
};

/// Scores the vertices of a candidate-viewpoint sphere for multi-view reconstruction
#[derive(Debug, FromArgs)]
struct Args {
    /// proxy mesh used for occlusion
    #[argh(positional)]
    proxy_mesh: String,

    /// dense proxy point cloud
    #[argh(positional)]
    proxy_cloud: String,

    /// candidate-viewpoint sphere mesh
    #[argh(positional)]
    candidate_sphere: String,
}

fn main() {
    env_logger::init();
    let args: Args = argh::from_env();

    let paths = ScenePaths::new(args.proxy_mesh, args.proxy_cloud, args.candidate_sphere);
    let config = PipelineConfig::default();
    match serde_json::to_string(&config) {
        Ok(json) => log::debug!("config: {json}"),
        Err(e) => log::warn!("cannot serialize config: {e}"),
    }

    match run_pipeline(&paths, &config) {
        Ok(output) => log::info!("wrote {}", output.display()),
        Err(e) => {
            log::error!("{e}");
            std::process::exit(1);
        }
    }
}
