//! Build configuration chosen by the operator
//!
//! Immutable once confirmed for a session.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BuildVariant {
    Debug,
    #[default]
    Release,
}

impl BuildVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildVariant::Debug => "debug",
            BuildVariant::Release => "release",
        }
    }

    /// Value for `CMAKE_BUILD_TYPE`
    pub fn cmake_build_type(&self) -> &'static str {
        match self {
            BuildVariant::Debug => "Debug",
            BuildVariant::Release => "Release",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompilerFamily {
    #[default]
    Gcc,
    Clang,
}

impl CompilerFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompilerFamily::Gcc => "gcc",
            CompilerFamily::Clang => "clang",
        }
    }

    /// C++ driver that must be reachable before a build
    pub fn executable(&self) -> &'static str {
        match self {
            CompilerFamily::Gcc => "g++",
            CompilerFamily::Clang => "clang++",
        }
    }

    /// Extra flags the family needs; clang builds against libstdc++
    pub fn cxx_flags(&self) -> Option<&'static str> {
        match self {
            CompilerFamily::Gcc => None,
            CompilerFamily::Clang => Some("-stdlib=libstdc++"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    CMake,
    Make,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::CMake => "cmake",
            BackendKind::Make => "make",
        }
    }

    /// Backend executable that must be reachable before a build
    pub fn executable(&self) -> &'static str {
        self.as_str()
    }

    /// File that marks a directory as buildable by this backend
    pub fn build_file(&self) -> &'static str {
        match self {
            BackendKind::CMake => "CMakeLists.txt",
            BackendKind::Make => "Makefile",
        }
    }

    /// Generated state removed before each attempt
    pub fn cache_artifacts(&self) -> &'static [&'static str] {
        match self {
            BackendKind::CMake => &["CMakeFiles", "CMakeCache.txt", "cmake_install.cmake"],
            BackendKind::Make => &["MakeFiles"],
        }
    }
}

macro_rules! impl_choice {
    ($ty:ty, $what:literal, $($text:literal => $variant:expr),+ $(,)?) => {
        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok($variant),)+
                    other => Err(format!("unknown {} '{}'", $what, other)),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

impl_choice!(BuildVariant, "build variant",
    "debug" => BuildVariant::Debug,
    "release" => BuildVariant::Release,
);
impl_choice!(CompilerFamily, "compiler",
    "gcc" => CompilerFamily::Gcc,
    "g++" => CompilerFamily::Gcc,
    "clang" => CompilerFamily::Clang,
    "clang++" => CompilerFamily::Clang,
);
impl_choice!(BackendKind, "build backend",
    "cmake" => BackendKind::CMake,
    "make" => BackendKind::Make,
);

/// Variant, compiler and backend for one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BuildConfiguration {
    pub variant: BuildVariant,
    pub compiler: CompilerFamily,
    pub backend: BackendKind,
}

impl BuildConfiguration {
    pub fn new(variant: BuildVariant, compiler: CompilerFamily, backend: BackendKind) -> Self {
        Self {
            variant,
            compiler,
            backend,
        }
    }

    /// Tools that must resolve before each attempt, backend first
    pub fn required_tools(&self) -> [&'static str; 2] {
        [self.backend.executable(), self.compiler.executable()]
    }
}

impl fmt::Display for BuildConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "variant={} compiler={} backend={}",
            self.variant, self.compiler, self.backend
        )
    }
}
