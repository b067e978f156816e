// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::collections::VecDeque;

use super::types::Breadcrumb;

/// Bounded trail of the most recent breadcrumbs.
#[derive(Debug, Clone)]
pub struct BreadcrumbTrail {
    crumbs: VecDeque<Breadcrumb>,
    capacity: usize,
}

impl BreadcrumbTrail {
    pub fn new(capacity: usize) -> Self {
        Self {
            crumbs: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, crumb: Breadcrumb) {
        if self.capacity == 0 {
            return;
        }
        if self.crumbs.len() == self.capacity {
            self.crumbs.pop_front();
        }
        self.crumbs.push_back(crumb);
    }

    /// Oldest first.
    pub fn snapshot(&self) -> Vec<Breadcrumb> {
        self.crumbs.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.crumbs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.crumbs.is_empty()
    }

    pub fn clear(&mut self) {
        self.crumbs.clear();
    }
}
