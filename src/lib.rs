// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

pub mod bridge;
pub mod cli;
pub mod config;
pub mod execute;
pub mod lockfile;
pub mod options;
pub mod process;
pub mod supervisor;
pub mod watcher;
