// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Path Builder Domain Service
//!
//! Computes the root directory of a new access point from the request name,
//! an optional base path and an optional sub-path template. The template
//! language is a fixed set of `${.Scope.field}` tokens; anything else that
//! looks like a token rejects the request.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Template interpolation and structural path validation

use thiserror::Error;
use uuid::Uuid;

use crate::domain::error::ProvisionError;

/// Maximum total length of a resolved root directory.
pub const MAX_PATH_LENGTH: usize = 100;
/// Maximum number of segments below `/`.
pub const MAX_PATH_DEPTH: usize = 4;

pub const PVC_NAME_TOKEN: &str = "${.PVC.name}";
pub const PVC_NAMESPACE_TOKEN: &str = "${.PVC.namespace}";
pub const PV_NAME_TOKEN: &str = "${.PV.name}";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathBuilderError {
    #[error("Sub path pattern {0} contains an unsupported token")]
    UnsupportedToken(String),

    #[error("Sub path pattern {0} resolves to the file system root")]
    ResolvesToRoot(String),

    #[error("Path {path} is {length} characters long, the limit is 100")]
    PathTooLong { path: String, length: usize },

    #[error("Path {path} is {depth} directories deep, the limit is 4")]
    PathTooDeep { path: String, depth: usize },
}

impl From<PathBuilderError> for ProvisionError {
    fn from(err: PathBuilderError) -> Self {
        ProvisionError::invalid_argument(err.to_string())
    }
}

/// Values available to template tokens, taken from orchestrator-injected parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateValues {
    pub pvc_name: Option<String>,
    pub pvc_namespace: Option<String>,
    pub pv_name: Option<String>,
}

impl TemplateValues {
    fn lookup(&self, token: &'static str) -> Option<&str> {
        match token {
            PVC_NAME_TOKEN => self.pvc_name.as_deref(),
            PVC_NAMESPACE_TOKEN => self.pvc_namespace.as_deref(),
            PV_NAME_TOKEN => self.pv_name.as_deref(),
            _ => None,
        }
    }
}

/// Inputs to a single path resolution.
#[derive(Debug, Clone, Default)]
pub struct PathRequest<'a> {
    pub name: &'a str,
    pub base_path: Option<&'a str>,
    pub sub_path_pattern: Option<&'a str>,
    pub ensure_unique_directory: bool,
    pub values: TemplateValues,
}

/// Path builder domain service.
#[derive(Debug, Clone)]
pub struct PathBuilder {
    max_length: usize,
    max_depth: usize,
}

impl PathBuilder {
    pub fn new() -> Self {
        Self {
            max_length: MAX_PATH_LENGTH,
            max_depth: MAX_PATH_DEPTH,
        }
    }

    /// Resolve and validate the absolute root directory for a request.
    ///
    /// Without a pattern the directory is the bare request name. With a
    /// pattern, the interpolated result gets a `-<uuid>` suffix on its last
    /// segment unless uniqueness is disabled.
    pub fn resolve(&self, request: &PathRequest<'_>) -> Result<String, PathBuilderError> {
        let leaf = match request.sub_path_pattern {
            Some(pattern) => {
                let interpolated = self.interpolate(pattern, &request.values)?;
                if request.ensure_unique_directory {
                    format!(
                        "{}-{}",
                        interpolated.trim_end_matches('/'),
                        Uuid::new_v4()
                    )
                } else {
                    interpolated
                }
            }
            None => request.name.to_string(),
        };

        let joined = format!("/{}/{}", request.base_path.unwrap_or(""), leaf);
        let path = clean_path(&joined);
        if path == "/" {
            return Err(PathBuilderError::ResolvesToRoot(
                request.sub_path_pattern.unwrap_or(request.name).to_string(),
            ));
        }
        self.validate(&path)?;
        Ok(path)
    }

    /// Substitute every supported token in `pattern`. A token with no value in
    /// the request becomes the empty string.
    ///
    /// Any `${` or `}` left after substitution means the pattern used a token
    /// outside the vocabulary.
    pub fn interpolate(
        &self,
        pattern: &str,
        values: &TemplateValues,
    ) -> Result<String, PathBuilderError> {
        let mut result = pattern.to_string();
        for token in [PVC_NAME_TOKEN, PVC_NAMESPACE_TOKEN, PV_NAME_TOKEN] {
            if result.contains(token) {
                result = result.replace(token, values.lookup(token).unwrap_or(""));
            }
        }

        if result.contains("${") || result.contains('}') {
            return Err(PathBuilderError::UnsupportedToken(pattern.to_string()));
        }
        Ok(result)
    }

    pub fn validate(&self, path: &str) -> Result<(), PathBuilderError> {
        if path.len() > self.max_length {
            return Err(PathBuilderError::PathTooLong {
                path: path.to_string(),
                length: path.len(),
            });
        }

        let depth = path.split('/').filter(|s| !s.is_empty()).count();
        if depth > self.max_depth {
            return Err(PathBuilderError::PathTooDeep {
                path: path.to_string(),
                depth,
            });
        }
        Ok(())
    }
}

impl Default for PathBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Lexically normalize an absolute path: collapse separators, drop `.`,
/// resolve `..` without escaping `/`.
pub fn clean_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    format!("/{}", segments.join("/"))
}
