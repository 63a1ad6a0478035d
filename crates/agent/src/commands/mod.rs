// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

pub mod keygen;
pub mod plugins;
pub mod serve;
pub mod submit;
