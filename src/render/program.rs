use std::collections::HashMap;

use super::backend::{
    BufferId, ProgramId, ALBUM_ART_UNIT, ANALYSER_L_UNIT, ANALYSER_M_UNIT, ANALYSER_R_UNIT,
};

/// The fixed set of names a visualization program may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformName {
    Width,
    Height,
    BufferLength,
    RmsL,
    RmsR,
    RmsM,
    AnalyserL,
    AnalyserR,
    AnalyserM,
    AlbumImage,
    Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// Field index into `FrameUniforms`
    Scalar(usize),
    /// Texture unit
    Sampler(usize),
    /// Vertex attribute slot
    Attribute(u32),
}

impl UniformName {
    pub const ALL: [UniformName; 11] = [
        UniformName::Width,
        UniformName::Height,
        UniformName::BufferLength,
        UniformName::RmsL,
        UniformName::RmsR,
        UniformName::RmsM,
        UniformName::AnalyserL,
        UniformName::AnalyserR,
        UniformName::AnalyserM,
        UniformName::AlbumImage,
        UniformName::Position,
    ];

    /// How the name is spelled in WGSL source.
    pub fn identifier(self) -> &'static str {
        match self {
            UniformName::Width => "u.width",
            UniformName::Height => "u.height",
            UniformName::BufferLength => "u.buffer_length",
            UniformName::RmsL => "u.rms_l",
            UniformName::RmsR => "u.rms_r",
            UniformName::RmsM => "u.rms_m",
            UniformName::AnalyserL => "analyser_l",
            UniformName::AnalyserR => "analyser_r",
            UniformName::AnalyserM => "analyser_m",
            UniformName::AlbumImage => "album_image",
            UniformName::Position => "a_position",
        }
    }

    fn location(self) -> Location {
        match self {
            UniformName::Width => Location::Scalar(0),
            UniformName::Height => Location::Scalar(1),
            UniformName::BufferLength => Location::Scalar(2),
            UniformName::RmsL => Location::Scalar(3),
            UniformName::RmsR => Location::Scalar(4),
            UniformName::RmsM => Location::Scalar(5),
            UniformName::AnalyserL => Location::Sampler(ANALYSER_L_UNIT),
            UniformName::AnalyserR => Location::Sampler(ANALYSER_R_UNIT),
            UniformName::AnalyserM => Location::Sampler(ANALYSER_M_UNIT),
            UniformName::AlbumImage => Location::Sampler(ALBUM_ART_UNIT),
            UniformName::Position => Location::Attribute(0),
        }
    }
}

/// A linked program, its fullscreen vertex buffer, and the locations of the
/// names its sources appear to use. Locations are informational; the render
/// loop writes every scalar regardless.
#[derive(Debug)]
pub struct ShaderProgramHandle {
    pub(crate) label: String,
    pub(crate) program: ProgramId,
    pub(crate) vertex_buffer: BufferId,
    pub(crate) locations: HashMap<UniformName, Location>,
}

impl ShaderProgramHandle {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn program(&self) -> ProgramId {
        self.program
    }

    pub fn vertex_buffer(&self) -> BufferId {
        self.vertex_buffer
    }

    pub fn location(&self, name: UniformName) -> Option<Location> {
        self.locations.get(&name).copied()
    }
}

/// Resolve locations for every known name referenced by either stage.
/// Binding declarations (`@group(..)` lines) do not count as references.
pub fn resolve_locations(vertex: &str, fragment: &str) -> HashMap<UniformName, Location> {
    UniformName::ALL
        .iter()
        .filter(|name| references(vertex, name.identifier()) || references(fragment, name.identifier()))
        .map(|&name| (name, name.location()))
        .collect()
}

fn references(source: &str, identifier: &str) -> bool {
    strip_block_comments(source)
        .lines()
        .map(|line| line.split("//").next().unwrap_or(""))
        .filter(|line| !line.trim_start().starts_with("@group"))
        .any(|line| contains_word(line, identifier))
}

/// Drop `/* .. */` spans; WGSL block comments nest.
fn strip_block_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut depth = 0usize;
    let mut rest = source;
    while !rest.is_empty() {
        if depth == 0 && rest.starts_with("//") {
            let end = rest.find('\n').unwrap_or(rest.len());
            out.push_str(&rest[..end]);
            rest = &rest[end..];
        } else if rest.starts_with("/*") {
            depth += 1;
            rest = &rest[2..];
        } else if depth > 0 && rest.starts_with("*/") {
            depth -= 1;
            rest = &rest[2..];
        } else {
            let mut chars = rest.chars();
            if let Some(c) = chars.next() {
                // Keep line structure so `//` and `@group` handling still works.
                if depth == 0 || c == '\n' {
                    out.push(c);
                }
            }
            rest = chars.as_str();
        }
    }
    out
}

fn contains_word(haystack: &str, word: &str) -> bool {
    let is_ident = |c: char| c.is_ascii_alphanumeric() || c == '_';
    haystack.match_indices(word).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + word.len()..].chars().next();
        !before.is_some_and(is_ident) && !after.is_some_and(is_ident)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERTEX: &str = "@vertex fn vs_main(@location(0) a_position: vec2<f32>) {}";

    #[test]
    fn resolves_only_referenced_names() {
        let fragment = "@group(0) @binding(5) var analyser_m: texture_2d<f32>;\n\
                        fn fs_main() { let x = u.width + u.rms_m; }";
        let locations = resolve_locations(VERTEX, fragment);
        assert_eq!(locations.get(&UniformName::Width), Some(&Location::Scalar(0)));
        assert_eq!(locations.get(&UniformName::RmsM), Some(&Location::Scalar(5)));
        assert_eq!(locations.get(&UniformName::Position), Some(&Location::Attribute(0)));
        assert!(!locations.contains_key(&UniformName::AnalyserM));
        assert!(!locations.contains_key(&UniformName::Height));
    }

    #[test]
    fn ignores_prefixes_and_comments() {
        let fragment = "let a = u.width_scale; // album_image\nlet b = my_analyser_l;";
        let locations = resolve_locations("", fragment);
        assert!(locations.is_empty());
    }

    #[test]
    fn block_comments_are_not_references() {
        let fragment = "/* u.height\n /* nested album_image */ analyser_l */ let w = u.width;";
        let locations = resolve_locations("", fragment);
        assert_eq!(locations.len(), 1);
        assert!(locations.contains_key(&UniformName::Width));
    }

    #[test]
    fn sampler_locations_are_texture_units() {
        let fragment = "textureSample(album_image, s, uv); textureSample(analyser_r, s, uv);";
        let locations = resolve_locations("", fragment);
        assert_eq!(locations.get(&UniformName::AlbumImage), Some(&Location::Sampler(ALBUM_ART_UNIT)));
        assert_eq!(locations.get(&UniformName::AnalyserR), Some(&Location::Sampler(ANALYSER_R_UNIT)));
    }
}
