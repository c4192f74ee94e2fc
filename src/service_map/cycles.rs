//! Directed cycle detection.
//!
//! A healthy dependency graph is acyclic. Every elementary circuit (a closed
//! path visiting no node twice) counts as one cycle, so two cycles sharing
//! edges are both reported. Circuits are enumerated with Johnson's algorithm
//! over each strongly connected component, using explicit stacks. Nodes on a
//! circuit are flagged and remember the closed path (`a -> b -> a`). Links
//! are flagged only when both endpoints are flagged, so edges that merely
//! touch a cycle stay clean.

use crate::service_map::model::{LinkMap, NodeMap};

/// Flags cycle participants and returns the number of elementary cycles.
pub fn detect_cycles(nodes: &mut NodeMap, links: &mut LinkMap) -> u64 {
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for link in links.iter() {
        if let (Some(source), Some(target)) = (
            nodes.position(link.source.as_str()),
            nodes.position(link.target.as_str()),
        ) {
            successors[source].push(target);
        }
    }

    let mut cycles = 0u64;
    for circuit in elementary_circuits(&successors) {
        cycles += 1;
        flag_cycle(nodes, &circuit);
    }

    flag_links(nodes, links);

    if cycles > 0 {
        tracing::debug!("Detected {} dependency cycle(s)", cycles);
    }
    cycles
}

/// Enumerates elementary circuits, each starting at its lowest position.
///
/// Circuits rooted at `s` are searched inside the part of `s`'s strongly
/// connected component made of positions `>= s`, so each circuit is found
/// exactly once.
fn elementary_circuits(successors: &[Vec<usize>]) -> Vec<Vec<usize>> {
    let count = successors.len();
    let component = strong_components(successors);
    let mut component_size = vec![0usize; count];
    for &c in &component {
        component_size[c] += 1;
    }

    let mut predecessors: Vec<Vec<usize>> = vec![Vec::new(); count];
    for (source, targets) in successors.iter().enumerate() {
        for &target in targets {
            predecessors[target].push(source);
        }
    }

    let mut circuits = Vec::new();
    let mut blocked = vec![false; count];
    let mut blocked_by: Vec<Vec<usize>> = vec![Vec::new(); count];

    for start in 0..count {
        if component_size[component[start]] < 2 {
            continue;
        }

        let candidate = |v: usize| component[v] == component[start] && v >= start;
        let forward = reachable(start, successors, &candidate);
        let backward = reachable(start, &predecessors, &candidate);
        let allowed: Vec<bool> = forward.iter().zip(&backward).map(|(f, b)| *f && *b).collect();
        if allowed.iter().filter(|&&a| a).count() < 2 {
            continue;
        }

        for v in 0..count {
            if allowed[v] {
                blocked[v] = false;
                blocked_by[v].clear();
            }
        }

        // Frames are (node, next successor to visit, closed a circuit)
        let mut frames: Vec<(usize, usize, bool)> = vec![(start, 0, false)];
        let mut path = vec![start];
        blocked[start] = true;

        while let Some(frame) = frames.last_mut() {
            let (node, next, _) = *frame;
            if let Some(&successor) = successors[node].get(next) {
                frame.1 += 1;
                if !allowed[successor] {
                    continue;
                }
                if successor == start {
                    frame.2 = true;
                    circuits.push(path.clone());
                } else if !blocked[successor] {
                    blocked[successor] = true;
                    path.push(successor);
                    frames.push((successor, 0, false));
                }
                continue;
            }

            let (node, _, closed) = *frame;
            frames.pop();
            path.pop();
            if closed {
                unblock(node, &mut blocked, &mut blocked_by);
            } else {
                for &successor in &successors[node] {
                    if allowed[successor] && !blocked_by[successor].contains(&node) {
                        blocked_by[successor].push(node);
                    }
                }
            }
            if let Some(parent) = frames.last_mut() {
                parent.2 |= closed;
            }
        }
    }

    circuits
}

fn unblock(node: usize, blocked: &mut [bool], blocked_by: &mut [Vec<usize>]) {
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        if blocked[current] {
            blocked[current] = false;
            stack.append(&mut blocked_by[current]);
        }
    }
}

/// Positions reachable from `start` through `edges` without leaving
/// `candidate`, `start` included.
fn reachable(start: usize, edges: &[Vec<usize>], candidate: &impl Fn(usize) -> bool) -> Vec<bool> {
    let mut seen = vec![false; edges.len()];
    seen[start] = true;
    let mut stack = vec![start];
    while let Some(node) = stack.pop() {
        for &next in &edges[node] {
            if !seen[next] && candidate(next) {
                seen[next] = true;
                stack.push(next);
            }
        }
    }
    seen
}

/// Strongly connected component id per position (Kosaraju, iterative).
fn strong_components(successors: &[Vec<usize>]) -> Vec<usize> {
    let count = successors.len();
    let mut visited = vec![false; count];
    let mut finished: Vec<usize> = Vec::with_capacity(count);

    for root in 0..count {
        if visited[root] {
            continue;
        }
        visited[root] = true;
        let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
        while let Some(frame) = stack.last_mut() {
            let (node, next) = *frame;
            match successors[node].get(next) {
                Some(&successor) => {
                    frame.1 += 1;
                    if !visited[successor] {
                        visited[successor] = true;
                        stack.push((successor, 0));
                    }
                },
                None => {
                    finished.push(node);
                    stack.pop();
                },
            }
        }
    }

    let mut predecessors: Vec<Vec<usize>> = vec![Vec::new(); count];
    for (source, targets) in successors.iter().enumerate() {
        for &target in targets {
            predecessors[target].push(source);
        }
    }

    let mut component = vec![usize::MAX; count];
    let mut next_component = 0;
    for &root in finished.iter().rev() {
        if component[root] != usize::MAX {
            continue;
        }
        component[root] = next_component;
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            for &previous in &predecessors[node] {
                if component[previous] == usize::MAX {
                    component[previous] = next_component;
                    stack.push(previous);
                }
            }
        }
        next_component += 1;
    }

    component
}

fn flag_cycle(nodes: &mut NodeMap, members: &[usize]) {
    let mut path: Vec<String> = members.iter().map(|&member| nodes[member].id.clone()).collect();
    if let Some(first) = path.first().cloned() {
        path.push(first);
    }

    for &member in members {
        let node = &mut nodes[member];
        node.invalid_cycle_detected = true;
        // A node on several cycles keeps the first one found
        if node.invalid_cycle_path.is_empty() {
            node.invalid_cycle_path = path.clone();
        }
    }
}

fn flag_links(nodes: &NodeMap, links: &mut LinkMap) {
    for link in links.iter_mut() {
        let (Some(source), Some(target)) = (
            nodes.position(link.source.as_str()),
            nodes.position(link.target.as_str()),
        ) else {
            continue;
        };
        if nodes[source].invalid_cycle_detected && nodes[target].invalid_cycle_detected {
            link.invalid_cycle_detected = true;
            link.invalid_cycle_path = nodes[source].invalid_cycle_path.clone();
        }
    }
}
