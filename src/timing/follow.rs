use std::collections::HashMap;

use crate::project::{ConfigError, Scene};

/// Follow links of one scene, as indices into `scene.tracks`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FollowForest {
    roots: Vec<usize>,
    children: Vec<Vec<usize>>,
}

impl FollowForest {
    /// Links every track to the track it follows. Every track must be
    /// reachable from a root, so cycles and unknown targets are errors.
    pub fn build(scene: &Scene) -> Result<Self, ConfigError> {
        let mut index_of: HashMap<&str, usize> = HashMap::new();
        for (i, track) in scene.tracks.iter().enumerate() {
            if index_of.insert(track.name.as_str(), i).is_some() {
                return Err(ConfigError::DuplicateSceneTrack {
                    scene: scene.name.clone(),
                    track: track.name.clone(),
                });
            }
        }

        let mut roots = Vec::new();
        let mut children = vec![Vec::new(); scene.tracks.len()];

        for (i, track) in scene.tracks.iter().enumerate() {
            match &track.follow {
                None => roots.push(i),
                Some(follow) => {
                    let parent = index_of.get(follow.as_str()).copied().ok_or_else(|| {
                        ConfigError::UnknownFollow {
                            scene: scene.name.clone(),
                            track: track.name.clone(),
                            follow: follow.clone(),
                        }
                    })?;
                    children[parent].push(i);
                }
            }
        }

        // Each follower has exactly one incoming link, so a walk from the
        // roots visits every track unless some of them form a cycle.
        let mut visited = vec![false; scene.tracks.len()];
        let mut queue = roots.clone();
        while let Some(i) = queue.pop() {
            visited[i] = true;
            queue.extend(children[i].iter().copied());
        }

        if visited.iter().any(|v| !v) {
            let tracks = scene
                .tracks
                .iter()
                .zip(&visited)
                .filter(|(_, v)| !**v)
                .map(|(t, _)| t.name.clone())
                .collect();
            return Err(ConfigError::FollowCycle {
                scene: scene.name.clone(),
                tracks,
            });
        }

        Ok(Self { roots, children })
    }

    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    pub fn children(&self, index: usize) -> &[usize] {
        self.children.get(index).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::SceneTrack;

    fn track(name: &str, follow: Option<&str>) -> SceneTrack {
        SceneTrack {
            name: name.to_string(),
            play: vec!["A".to_string()],
            follow: follow.map(str::to_string),
            master: false,
        }
    }

    fn scene(tracks: Vec<SceneTrack>) -> Scene {
        Scene {
            name: "s".to_string(),
            repeat: 1,
            ppq: None,
            tracks,
        }
    }

    #[test]
    fn links_children_in_scene_order() {
        let forest = FollowForest::build(&scene(vec![
            track("kick", None),
            track("snare", Some("kick")),
            track("hat", None),
            track("clap", Some("kick")),
            track("fill", Some("snare")),
        ]))
        .unwrap();

        assert_eq!(forest.roots(), &[0, 2]);
        assert_eq!(forest.children(0), &[1, 3]);
        assert_eq!(forest.children(1), &[4]);
        assert!(forest.children(2).is_empty());
    }

    #[test]
    fn self_follow_is_a_cycle() {
        let err = FollowForest::build(&scene(vec![track("kick", Some("kick"))])).unwrap_err();
        assert!(matches!(err, ConfigError::FollowCycle { tracks, .. } if tracks == vec!["kick"]));
    }

    #[test]
    fn detects_longer_cycle_next_to_valid_tree() {
        let err = FollowForest::build(&scene(vec![
            track("kick", None),
            track("a", Some("c")),
            track("b", Some("a")),
            track("c", Some("b")),
        ]))
        .unwrap_err();

        match err {
            ConfigError::FollowCycle { tracks, .. } => assert_eq!(tracks, vec!["a", "b", "c"]),
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn unknown_follow_target() {
        let err = FollowForest::build(&scene(vec![track("snare", Some("kick"))])).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownFollow { .. }));
    }

    #[test]
    fn duplicate_names_rejected() {
        let err = FollowForest::build(&scene(vec![track("kick", None), track("kick", None)]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateSceneTrack { .. }));
    }
}
