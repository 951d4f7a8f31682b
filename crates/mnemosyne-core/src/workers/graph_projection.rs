//! Graph Projection Worker (§4.4): recompute the user's 3D embedding
//! projection so a UI can visualize the graph.

use super::Stores;
use anyhow::{Context, Result};
use mnemosyne_common::entities::{
    GraphProjection, ProjectionEdge, ProjectionMetadata, ProjectionNode, ProjectionPosition,
};
use mnemosyne_common::events::GraphQueueEvent;

const PROJECTION_NS: &str = "graph_projection";
const COORDINATE_LIMIT: f32 = 100.0;
const MIN_MEAN_DISTANCE: f32 = 0.1;

pub async fn process(stores: &Stores, event: GraphQueueEvent) {
    let user_id = match event {
        GraphQueueEvent::NewEntitiesCreated(e) | GraphQueueEvent::CycleArtifactsCreated(e) => e.user_id,
        GraphQueueEvent::Unknown => return,
    };

    if let Err(e) = run(stores, &user_id).await {
        tracing::error!(user_id, error = %e, "graph projection recompute failed");
    }
}

async fn run(stores: &Stores, user_id: &str) -> Result<()> {
    // Step 1: non-merged, non-archived nodes and all edges.
    let nodes = stores.graph.list_active_nodes(user_id).await?;
    let edges = stores.graph.list_all_edges_for_user(user_id).await?;

    // Step 2: fetch each node's stored vector. Nodes without one are
    // excluded from reduction and placed at the origin (documented choice).
    let mut vectors = Vec::new();
    let mut reducible_indices = Vec::new();
    for (idx, node) in nodes.iter().enumerate() {
        if let Some((vector, _, _)) = stores.vector.get_vector(node.entity_id).await? {
            reducible_indices.push(idx);
            vectors.push(vector);
        }
    }

    // Step 3: call the reducer.
    let algorithm = &stores.config.reducer.default_algorithm;
    let positions = if vectors.is_empty() {
        Vec::new()
    } else {
        stores
            .reducer
            .reduce(&vectors, algorithm)
            .await
            .context("dimensionality reduction failed")?
    };

    let mut position_by_index = vec![None; nodes.len()];
    for (pos, idx) in positions.into_iter().zip(reducible_indices.into_iter()) {
        position_by_index[idx] = Some(validate_position(pos));
    }

    // Step 4: assemble and upsert the singleton projection.
    let projection_nodes: Vec<ProjectionNode> = nodes
        .iter()
        .zip(position_by_index.into_iter())
        .map(|(node, position)| ProjectionNode {
            entity_id: node.entity_id,
            entity_type: node.entity_type,
            position: position.unwrap_or(ProjectionPosition { x: 0.0, y: 0.0, z: 0.0 }),
            properties: node.properties.clone(),
        })
        .collect();

    let projection_edges: Vec<ProjectionEdge> = edges
        .into_iter()
        .map(|r| ProjectionEdge {
            source: r.source_entity_id,
            target: r.target_entity_id,
            relationship_type: r.relationship_type,
        })
        .collect();

    let node_count = projection_nodes.len();
    let projection = GraphProjection {
        user_id: user_id.to_string(),
        nodes: projection_nodes,
        edges: projection_edges,
        metadata: ProjectionMetadata {
            algorithm: algorithm.clone(),
            node_count,
            generated_at: chrono::Utc::now(),
        },
    };

    if node_count > 0 {
        let mean_distance = mean_distance_from_origin(&projection.nodes);
        if mean_distance <= MIN_MEAN_DISTANCE {
            tracing::warn!(user_id, mean_distance, "reduction looks degenerate (mean distance from origin too small)");
        }
    }

    stores
        .relational
        .put(PROJECTION_NS, user_id, user_id, &projection)?;
    Ok(())
}

fn validate_position(mut pos: ProjectionPosition) -> ProjectionPosition {
    for coord in [&mut pos.x, &mut pos.y, &mut pos.z] {
        if !coord.is_finite() {
            *coord = 0.0;
        }
        if coord.abs() >= COORDINATE_LIMIT {
            *coord = coord.signum() * (COORDINATE_LIMIT - 1.0);
        }
    }
    pos
}

fn mean_distance_from_origin(nodes: &[ProjectionNode]) -> f32 {
    if nodes.is_empty() {
        return 0.0;
    }
    let total: f32 = nodes
        .iter()
        .map(|n| (n.position.x.powi(2) + n.position.y.powi(2) + n.position.z.powi(2)).sqrt())
        .sum();
    total / nodes.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_position_clamps_out_of_range_coordinates() {
        let pos = validate_position(ProjectionPosition { x: 200.0, y: f32::NAN, z: -150.0 });
        assert!(pos.x < COORDINATE_LIMIT);
        assert_eq!(pos.y, 0.0);
        assert!(pos.z > -COORDINATE_LIMIT);
    }

    #[test]
    fn mean_distance_from_origin_of_empty_set_is_zero() {
        assert_eq!(mean_distance_from_origin(&[]), 0.0);
    }
}
