pub const MANIFEST_JSON: &str = include_str!("../../shaders/manifest.json");

/// Built-in shader sources, keyed by their path in the manifest.
pub fn embedded_source(path: &str) -> Option<&'static str> {
    match path {
        "fullscreen.wgsl" => Some(include_str!("../../shaders/fullscreen.wgsl")),
        "bindings.wgsl" => Some(include_str!("../../shaders/bindings.wgsl")),
        "programs/nothing.wgsl" => Some(include_str!("../../shaders/programs/nothing.wgsl")),
        "programs/img_test.wgsl" => Some(include_str!("../../shaders/programs/img_test.wgsl")),
        "programs/stereo_bars.wgsl" => Some(include_str!("../../shaders/programs/stereo_bars.wgsl")),
        "programs/stereo_color.wgsl" => Some(include_str!("../../shaders/programs/stereo_color.wgsl")),
        "programs/stereo_ca.wgsl" => Some(include_str!("../../shaders/programs/stereo_ca.wgsl")),
        "programs/spectrum_analyzer_simple.wgsl" => {
            Some(include_str!("../../shaders/programs/spectrum_analyzer_simple.wgsl"))
        }
        "programs/spectrum_analyzer.wgsl" => Some(include_str!("../../shaders/programs/spectrum_analyzer.wgsl")),
        _ => None,
    }
}
