use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use super::embedded::{embedded_source, MANIFEST_JSON};
use super::manifest::{LibraryManifest, ParamDef, ProgramManifest};
use crate::error::{VisError, VisResult};

pub struct LoadedProgram {
    pub manifest: ProgramManifest,
    pub fragment_body: String,
}

/// Complete sources for one program, ready for the GPU backend.
#[derive(Debug, Clone)]
pub struct BuiltProgram {
    pub label: String,
    pub vertex: String,
    pub fragment: String,
}

/// All fragment programs available to the mode table, sharing one vertex
/// stage and one binding prelude.
pub struct ShaderLibrary {
    vertex: String,
    prelude: String,
    programs: BTreeMap<String, LoadedProgram>,
}

impl ShaderLibrary {
    pub fn embedded() -> Result<Self> {
        let manifest: LibraryManifest =
            serde_json::from_str(MANIFEST_JSON).context("Failed to parse embedded shader manifest")?;
        let source = |path: &str| {
            embedded_source(path)
                .map(str::to_string)
                .with_context(|| format!("Embedded shader '{}' is missing", path))
        };

        let vertex = source(&manifest.vertex)?;
        let prelude = source(&manifest.prelude)?;
        let mut programs = BTreeMap::new();
        for program in manifest.programs {
            let fragment_body = source(&program.fragment)?;
            programs.insert(
                program.name.clone(),
                LoadedProgram {
                    manifest: program,
                    fragment_body,
                },
            );
        }
        Ok(Self {
            vertex,
            prelude,
            programs,
        })
    }

    /// Override or add fragment programs from `<name>.wgsl` files in `dir`.
    /// Overrides keep the built-in parameter definitions.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize> {
        let mut paths = Vec::new();
        for entry in
            std::fs::read_dir(dir).with_context(|| format!("Failed to read shader dir: {}", dir.display()))?
        {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("wgsl") {
                paths.push(path);
            }
        }
        paths.sort();

        for path in &paths {
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let body = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read shader: {}", path.display()))?;
            match self.programs.get_mut(name) {
                Some(program) => {
                    log::info!("Overriding shader '{}' from {}", name, path.display());
                    program.fragment_body = body;
                }
                None => {
                    log::info!("Adding shader '{}' from {}", name, path.display());
                    self.programs.insert(
                        name.to_string(),
                        LoadedProgram {
                            manifest: ProgramManifest::bare(name, &path.display().to_string()),
                            fragment_body: body,
                        },
                    );
                }
            }
        }
        Ok(paths.len())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.programs.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&LoadedProgram> {
        self.programs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.programs.contains_key(name)
    }

    /// Assemble the vertex stage and the prelude-prefixed fragment for `name`.
    pub fn build(&self, name: &str, overrides: &HashMap<String, String>) -> VisResult<BuiltProgram> {
        let program = self
            .programs
            .get(name)
            .ok_or_else(|| VisError::UnknownShader(name.to_string()))?;
        let fragment = format!("{}\n{}", self.prelude, program.fragment_body);
        Ok(BuiltProgram {
            label: name.to_string(),
            vertex: self.vertex.clone(),
            fragment: inject_params(&fragment, &program.manifest.parameters, overrides),
        })
    }
}

/// Prepend program parameters to `shader_src` as WGSL `const` declarations.
/// Overrides are parsed per the declared type; unparsable ones fall back to
/// the default.
pub fn inject_params(
    shader_src: &str,
    parameters: &BTreeMap<String, ParamDef>,
    overrides: &HashMap<String, String>,
) -> String {
    if parameters.is_empty() {
        return shader_src.to_string();
    }

    let mut consts = String::from("// Program parameters\n");
    for (name, def) in parameters {
        let upper = name.to_uppercase();
        let value = overrides.get(name.as_str());
        match def.param_type.as_str() {
            "int" => {
                let v = value
                    .and_then(|v| v.parse::<i64>().ok())
                    .or_else(|| def.default.as_i64())
                    .unwrap_or(0);
                let v = def.clamp(v as f64) as i64;
                consts.push_str(&format!("const PARAM_{}: i32 = {};\n", upper, v));
            }
            "float" => {
                let v = value
                    .and_then(|v| v.parse::<f64>().ok())
                    .or_else(|| def.default.as_f64())
                    .unwrap_or(0.0);
                consts.push_str(&format!("const PARAM_{}: f32 = {:.6};\n", upper, def.clamp(v)));
            }
            "bool" => {
                let v = value
                    .map(|v| v == "true" || v == "1")
                    .or_else(|| def.default.as_bool())
                    .unwrap_or(false);
                consts.push_str(&format!("const PARAM_{}: i32 = {};\n", upper, v as i32));
            }
            "color" => {
                let from_override = value.and_then(|v| {
                    let parts: Vec<f64> = v.split(',').filter_map(|s| s.trim().parse().ok()).collect();
                    (parts.len() >= 3).then(|| [parts[0], parts[1], parts[2]])
                });
                let from_default = || {
                    def.default.as_array().map(|arr| {
                        let c = |i: usize| arr.get(i).and_then(|v| v.as_f64()).unwrap_or(0.0);
                        [c(0), c(1), c(2)]
                    })
                };
                let [r, g, b] = from_override.or_else(from_default).unwrap_or([0.0; 3]);
                consts.push_str(&format!("const PARAM_{}_R: f32 = {:.6};\n", upper, r));
                consts.push_str(&format!("const PARAM_{}_G: f32 = {:.6};\n", upper, g));
                consts.push_str(&format!("const PARAM_{}_B: f32 = {:.6};\n", upper, b));
            }
            other => {
                log::warn!("Unknown parameter type '{}' for '{}'", other, name);
            }
        }
    }

    consts.push('\n');
    consts + shader_src
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::program::{resolve_locations, UniformName};

    fn param(param_type: &str, default: serde_json::Value) -> ParamDef {
        ParamDef {
            param_type: param_type.to_string(),
            default,
            min: None,
            max: None,
        }
    }

    #[test]
    fn embedded_library_has_every_program() {
        let library = ShaderLibrary::embedded().unwrap();
        let names: Vec<&str> = library.names().collect();
        assert_eq!(
            names,
            vec![
                "img_test",
                "nothing",
                "spectrum_analyzer",
                "spectrum_analyzer_simple",
                "stereo_bars",
                "stereo_ca",
                "stereo_color",
            ]
        );
        for name in names {
            let built = library.build(name, &HashMap::new()).unwrap();
            assert!(built.vertex.contains("fn vs_main"));
            assert!(built.fragment.contains("fn fs_main"));
            assert!(built.fragment.contains("var<uniform> u: Uniforms"));
        }
    }

    #[test]
    fn unknown_program_is_an_error() {
        let library = ShaderLibrary::embedded().unwrap();
        assert!(matches!(
            library.build("plasma", &HashMap::new()),
            Err(VisError::UnknownShader(name)) if name == "plasma"
        ));
    }

    #[test]
    fn strength_defaults_and_clamps() {
        let library = ShaderLibrary::embedded().unwrap();
        let built = library.build("stereo_ca", &HashMap::new()).unwrap();
        assert!(built.fragment.starts_with("// Program parameters\nconst PARAM_STRENGTH: f32 = 0.500000;"));

        let overrides = HashMap::from([("strength".to_string(), "5".to_string())]);
        let built = library.build("stereo_ca", &overrides).unwrap();
        assert!(built.fragment.contains("const PARAM_STRENGTH: f32 = 1.000000;"));
    }

    #[test]
    fn built_programs_reference_only_what_they_use() {
        let library = ShaderLibrary::embedded().unwrap();

        let nothing = library.build("nothing", &HashMap::new()).unwrap();
        let locations = resolve_locations(&nothing.vertex, &nothing.fragment);
        assert_eq!(locations.len(), 1);
        assert!(locations.contains_key(&UniformName::Position));

        let spectrum = library.build("spectrum_analyzer", &HashMap::new()).unwrap();
        let locations = resolve_locations(&spectrum.vertex, &spectrum.fragment);
        assert!(locations.contains_key(&UniformName::AnalyserM));
        assert!(locations.contains_key(&UniformName::AlbumImage));
        assert!(locations.contains_key(&UniformName::Width));
        assert!(!locations.contains_key(&UniformName::AnalyserL));
        assert!(!locations.contains_key(&UniformName::RmsM));
    }

    #[test]
    fn directory_overrides_and_adds_programs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("stereo_bars.wgsl"), "// custom bars\n").unwrap();
        std::fs::write(dir.path().join("plasma.wgsl"), "// plasma\n").unwrap();
        std::fs::write(dir.path().join("README.txt"), "not a shader").unwrap();

        let mut library = ShaderLibrary::embedded().unwrap();
        assert_eq!(library.load_dir(dir.path()).unwrap(), 2);

        assert_eq!(library.get("stereo_bars").unwrap().fragment_body, "// custom bars\n");
        assert_eq!(library.get("stereo_bars").unwrap().manifest.display_name, "Stereo Bars");
        let plasma = library.get("plasma").unwrap();
        assert_eq!(plasma.manifest.display_name, "plasma");
        assert!(plasma.manifest.parameters.is_empty());
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut library = ShaderLibrary::embedded().unwrap();
        assert!(library.load_dir(&dir.path().join("nope")).is_err());
    }

    #[test]
    fn injects_typed_constants() {
        let parameters = BTreeMap::from([
            ("count".to_string(), param("int", serde_json::json!(4))),
            ("mirror".to_string(), param("bool", serde_json::json!(false))),
            ("tint".to_string(), param("color", serde_json::json!([1.0, 0.5, 0.0]))),
        ]);
        let overrides = HashMap::from([
            ("mirror".to_string(), "true".to_string()),
            ("count".to_string(), "not a number".to_string()),
        ]);
        let src = inject_params("fn main() {}", &parameters, &overrides);
        assert!(src.contains("const PARAM_COUNT: i32 = 4;\n"));
        assert!(src.contains("const PARAM_MIRROR: i32 = 1;\n"));
        assert!(src.contains("const PARAM_TINT_G: f32 = 0.500000;\n"));
        assert!(src.ends_with("fn main() {}"));
    }

    #[test]
    fn no_parameters_leaves_source_untouched() {
        assert_eq!(inject_params("fn f() {}", &BTreeMap::new(), &HashMap::new()), "fn f() {}");
    }
}
