//! # Drupal Theme Build
//!
//! Sass build automation for Drupal themes: compile, watch, live-reload,
//! image and script minification.
//!
//! This library resolves where a theme's style sources and outputs live,
//! either from explicit directories or from the conventional Drupal layouts,
//! and runs named build operations against that resolved configuration.
//!
//! ## Features
//!
//! - Theme layout probing (`themes/`, `themes/custom/`, under `web/` or
//!   `public_html/`)
//! - In-process SCSS compilation with optional source maps
//! - Debounced file watching with overlap-free recompiles
//! - LiveReload protocol server
//! - Parallel image optimization using Rayon
//!
//! ## Usage
//!
//! ```ignore
//! use drupal_theme_build::resolver::{ResolveArgs, Resolver};
//! use drupal_theme_build::probe::FsInspector;
//!
//! let args = ResolveArgs { theme: Some("olivero".into()), ..Default::default() };
//! let config = Resolver::new(FsInspector, cwd).resolve(&args)?;
//! ```

/// Stale source map removal
pub mod clean;

/// SCSS compilation, vendor prefixing and source maps
pub mod compiler;

/// CLI arguments and the resolved build configuration
pub mod config;

/// Error types for configuration and operations
pub mod error;

/// Image optimization
pub mod imagemin;

/// LiveReload protocol server
pub mod livereload;

/// Timestamped console logging and alerts
pub mod logger;

/// First-match path probing over an inspectable file system
pub mod probe;

/// Build configuration resolution
pub mod resolver;

/// Operation sequencing
pub mod runner;

/// Drupal theme layout conventions
pub mod theme;

/// External tool lookup and invocation
pub mod tools;

/// Script merging and minification
pub mod uglify;

/// File watching event loop
pub mod watch;
