// tag.rs — label variants and the functions that build them
//
// Three renderings of a label:
// - Sprite:    textured billboard drawn by the raster pass, always faces the camera
// - Overlay3D: element placed and rotated with the scene, may show its back
// - Overlay2D: element anchored at a projected point, never rotated
// A sprite may carry an Overlay2D child (composite label).

use crate::config::TagConfig;
use crate::dispose::Disposable;
use crate::document::{Document, ElementHandle};
use crate::material::SpriteMaterial;
use crate::scene::{Object3D, ObjectKind};
use crate::texture::TextureLoader;

use glam::{Quat, Vec3};
use std::path::{Path, PathBuf};

pub type TagPosition = Vec3;
pub type TagScale = Vec3;

#[derive(Debug)]
pub struct Sprite {
    pub material: SpriteMaterial,
}

#[derive(Debug)]
pub struct Overlay3D {
    pub element: ElementHandle,
    facing_flipped: bool,
}

impl Overlay3D {
    /// True when the label was yawed by π because it sits behind the default view.
    pub fn facing_flipped(&self) -> bool {
        self.facing_flipped
    }
}

/// Screen-space label; object scale has no effect on it.
#[derive(Debug)]
pub struct Overlay2D {
    pub element: ElementHandle,
}

#[derive(Debug)]
pub enum Label {
    Sprite(Sprite),
    Overlay3D(Overlay3D),
    Overlay2D(Overlay2D),
}

impl Label {
    pub fn element(&self) -> Option<&ElementHandle> {
        match self {
            Label::Sprite(_) => None,
            Label::Overlay3D(o) => Some(&o.element),
            Label::Overlay2D(o) => Some(&o.element),
        }
    }

    /// Overlay labels own nothing renderer-side: their element belongs to the document.
    pub fn as_disposable_mut(&mut self) -> Option<&mut dyn Disposable> {
        match self {
            Label::Sprite(s) => Some(&mut s.material),
            Label::Overlay3D(_) | Label::Overlay2D(_) => None,
        }
    }

    pub fn is_disposed(&self) -> bool {
        match self {
            Label::Sprite(s) => s.material.is_disposed(),
            Label::Overlay3D(_) | Label::Overlay2D(_) => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpriteParams {
    pub position: TagPosition,
    pub scale: TagScale,
    pub texture_path: PathBuf,
    /// Roll in radians.
    pub rotation: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlayParams {
    pub element_id: String,
    /// Position relative to the parent sprite.
    pub offset: TagPosition,
}

/// Builds label objects. Nothing is added to a scene here.
#[derive(Debug, Clone, Copy)]
pub struct TagFactory<'a> {
    document: &'a Document,
    textures: &'a TextureLoader,
}

impl<'a> TagFactory<'a> {
    pub fn new(document: &'a Document, textures: &'a TextureLoader) -> Self {
        Self { document, textures }
    }

    fn element(&self, element_id: &str) -> Option<ElementHandle> {
        let handle = self.document.get_element_by_id(element_id);
        if handle.is_none() {
            log::warn!("no element with id {:?}, label skipped", element_id);
        }
        handle
    }

    pub fn create_sprite(
        &self,
        position: TagPosition,
        scale: TagScale,
        texture_path: impl AsRef<Path>,
        rotation: f32,
    ) -> Object3D {
        let texture = self.textures.load(texture_path);
        let material = SpriteMaterial::new(texture, rotation);
        let mut object = Object3D::new(ObjectKind::Label(Label::Sprite(Sprite { material })))
            .with_name("sprite");
        object.scale = scale;
        object.position = position;
        object
    }

    pub fn create_overlay_3d(
        &self,
        element_id: &str,
        position: TagPosition,
        scale: TagScale,
    ) -> Option<Object3D> {
        let element = self.element(element_id)?;
        // Labels face +Z; one placed at z > 0 would show its back to the default view.
        let facing_flipped = position.z > 0.0;

        let mut object = Object3D::new(ObjectKind::Label(Label::Overlay3D(Overlay3D {
            element,
            facing_flipped,
        })))
        .with_name(element_id);
        object.scale = scale;
        object.position = position;
        if facing_flipped {
            object.rotation = Quat::from_rotation_y(std::f32::consts::PI);
        }
        log::debug!("overlay3d {:?} at {:?} (flipped: {})", element_id, position, facing_flipped);
        Some(object)
    }

    /// `_scale` is accepted for symmetry with the other builders; size comes from the element.
    pub fn create_overlay_2d(
        &self,
        element_id: &str,
        position: TagPosition,
        _scale: TagScale,
    ) -> Option<Object3D> {
        let element = self.element(element_id)?;
        let mut object = Object3D::new(ObjectKind::Label(Label::Overlay2D(Overlay2D { element })))
            .with_name(element_id);
        object.position = position;
        log::debug!("overlay2d {:?} at {:?}", element_id, position);
        Some(object)
    }

    /// The sprite is always returned; the overlay child is attached only if its element exists.
    pub fn create_sprite_with_overlay_2d(
        &self,
        overlay: &OverlayParams,
        sprite: &SpriteParams,
    ) -> Object3D {
        let mut child = self.create_overlay_2d(&overlay.element_id, overlay.offset, sprite.scale);
        if let Some(c) = child.as_mut() {
            c.position = overlay.offset;
        }

        let mut object =
            self.create_sprite(sprite.position, sprite.scale, &sprite.texture_path, sprite.rotation);
        if let Some(c) = child {
            object.add(c);
        }
        object
    }

    pub fn create_label(
        &self,
        element_id: &str,
        position: TagPosition,
        scale: TagScale,
        three_d: bool,
    ) -> Option<Object3D> {
        if three_d {
            self.create_overlay_3d(element_id, position, scale)
        } else {
            self.create_overlay_2d(element_id, position, scale)
        }
    }

    pub fn from_config(&self, tag: &TagConfig) -> Option<Object3D> {
        match tag {
            TagConfig::Sprite { position, scale, texture, rotation } => {
                Some(self.create_sprite(*position, *scale, texture, *rotation))
            }
            TagConfig::Overlay3d { element, position, scale } => {
                self.create_overlay_3d(element, *position, *scale)
            }
            TagConfig::Overlay2d { element, position, scale } => {
                self.create_overlay_2d(element, *position, *scale)
            }
            TagConfig::SpriteWith2d { element, offset, position, scale, texture, rotation } => {
                Some(self.create_sprite_with_overlay_2d(
                    &OverlayParams { element_id: element.clone(), offset: *offset },
                    &SpriteParams {
                        position: *position,
                        scale: *scale,
                        texture_path: PathBuf::from(texture),
                        rotation: *rotation,
                    },
                ))
            }
            TagConfig::Label { element, position, scale, three_d } => {
                self.create_label(element, *position, *scale, *three_d)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AssetBase;
    use crate::document::Element;
    use crate::scene::Scene;
    use crate::texture::{texture_channel, TextureEvents};

    fn fixture() -> (Document, TextureLoader, TextureEvents) {
        let doc = Document::from_elements([Element::new("tv", "TV"), Element::new("door", "Door")]);
        let (loader, events) = texture_channel(AssetBase::new("/nonexistent"));
        (doc, loader, events)
    }

    fn sprite_params() -> SpriteParams {
        SpriteParams {
            position: Vec3::new(5.0, 1.0, -20.0),
            scale: Vec3::new(4.0, 4.0, 1.0),
            texture_path: PathBuf::from("tag.png"),
            rotation: 0.25,
        }
    }

    #[test]
    fn sprite_sets_transform_and_roll() {
        let (doc, loader, _events) = fixture();
        let f = TagFactory::new(&doc, &loader);
        let s = f.create_sprite(Vec3::new(1.0, 2.0, 3.0), Vec3::new(2.0, 3.0, 1.0), "tag.png", 0.5);
        assert_eq!(s.position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(s.scale, Vec3::new(2.0, 3.0, 1.0));
        match s.label() {
            Some(Label::Sprite(sprite)) => {
                assert_eq!(sprite.material.rotation, 0.5);
                assert!(sprite.material.map.is_some());
            }
            other => panic!("expected sprite, got {:?}", other),
        }
    }

    #[test]
    fn missing_element_yields_none() {
        let (doc, loader, _events) = fixture();
        let f = TagFactory::new(&doc, &loader);
        assert!(f.create_overlay_3d("nope", Vec3::ZERO, Vec3::ONE).is_none());
        assert!(f.create_overlay_2d("nope", Vec3::ZERO, Vec3::ONE).is_none());
        assert!(f.create_label("nope", Vec3::ZERO, Vec3::ONE, true).is_none());
        assert!(f.create_label("nope", Vec3::ZERO, Vec3::ONE, false).is_none());
    }

    #[test]
    fn overlay_3d_flips_only_for_positive_z() {
        let (doc, loader, _events) = fixture();
        let f = TagFactory::new(&doc, &loader);
        let flip = Quat::from_rotation_y(std::f32::consts::PI);

        let behind = f.create_overlay_3d("tv", Vec3::new(0.0, 0.0, 0.01), Vec3::ONE).unwrap();
        assert!(behind.rotation.abs_diff_eq(flip, 1e-6));
        assert!(matches!(behind.label(), Some(Label::Overlay3D(o)) if o.facing_flipped()));

        for z in [0.0, -0.0, -50.0] {
            let o = f.create_overlay_3d("tv", Vec3::new(3.0, 0.0, z), Vec3::splat(0.5)).unwrap();
            assert_eq!(o.rotation, Quat::IDENTITY);
            assert_eq!(o.scale, Vec3::splat(0.5));
            assert!(matches!(o.label(), Some(Label::Overlay3D(l)) if !l.facing_flipped()));
        }
    }

    #[test]
    fn overlay_2d_ignores_scale() {
        let (doc, loader, _events) = fixture();
        let f = TagFactory::new(&doc, &loader);
        let o = f.create_overlay_2d("door", Vec3::new(1.0, 2.0, 3.0), Vec3::splat(9.0)).unwrap();
        assert_eq!(o.position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(o.scale, Vec3::ONE);
        assert_eq!(o.label().and_then(|l| l.element()).map(|e| e.id()), Some("door"));
    }

    #[test]
    fn label_dispatches_on_flag() {
        let (doc, loader, _events) = fixture();
        let f = TagFactory::new(&doc, &loader);
        let three = f.create_label("tv", Vec3::ZERO, Vec3::ONE, true).unwrap();
        let two = f.create_label("tv", Vec3::ZERO, Vec3::ONE, false).unwrap();
        assert!(matches!(three.label(), Some(Label::Overlay3D(_))));
        assert!(matches!(two.label(), Some(Label::Overlay2D(_))));
    }

    #[test]
    fn composite_places_overlay_at_offset() {
        let (doc, loader, _events) = fixture();
        let f = TagFactory::new(&doc, &loader);
        let offset = Vec3::new(0.0, 3.0, 0.5);
        let mut params = sprite_params();
        params.scale = Vec3::ONE;

        let sprite = f.create_sprite_with_overlay_2d(
            &OverlayParams { element_id: "tv".to_string(), offset },
            &params,
        );
        assert_eq!(sprite.position, params.position);
        assert_eq!(sprite.children().len(), 1);
        let child = &sprite.children()[0];
        assert_eq!(child.position, offset);
        assert!(matches!(child.label(), Some(Label::Overlay2D(_))));

        let mut scene = Scene::new();
        let child_id = child.id();
        scene.add(sprite);
        let world = scene.world_matrix(child_id).unwrap().transform_point3(Vec3::ZERO);
        assert!((world - (params.position + offset)).length() < 1e-5);
    }

    #[test]
    fn composite_overwrites_initial_overlay_position() {
        let (doc, loader, _events) = fixture();
        let f = TagFactory::new(&doc, &loader);
        let params = sprite_params();
        let offset = Vec3::new(1.0, -1.0, 2.0);
        let sprite = f.create_sprite_with_overlay_2d(
            &OverlayParams { element_id: "tv".to_string(), offset },
            &params,
        );
        let child = &sprite.children()[0];
        // neither the sprite's position nor its scale leaks into the child
        assert_eq!(child.position, offset);
        assert_ne!(child.position, params.position);
        assert_eq!(child.scale, Vec3::ONE);
    }

    #[test]
    fn composite_without_element_still_returns_sprite() {
        let (doc, loader, _events) = fixture();
        let f = TagFactory::new(&doc, &loader);
        let sprite = f.create_sprite_with_overlay_2d(
            &OverlayParams { element_id: "missing".to_string(), offset: Vec3::Y },
            &sprite_params(),
        );
        assert!(matches!(sprite.label(), Some(Label::Sprite(_))));
        assert!(sprite.children().is_empty());
    }

    #[test]
    fn dropping_a_label_keeps_the_element() {
        let (doc, loader, _events) = fixture();
        let f = TagFactory::new(&doc, &loader);
        let label = f.create_overlay_3d("tv", Vec3::ZERO, Vec3::ONE).unwrap();
        drop(label);
        assert!(doc.get_element_by_id("tv").is_some());
    }

    #[test]
    fn builds_from_config() {
        let (doc, loader, _events) = fixture();
        let f = TagFactory::new(&doc, &loader);
        let tag = TagConfig::SpriteWith2d {
            element: "door".to_string(),
            offset: Vec3::Y,
            position: Vec3::new(0.0, 0.0, -10.0),
            scale: Vec3::ONE,
            texture: "tag.png".to_string(),
            rotation: 0.0,
        };
        let obj = f.from_config(&tag).unwrap();
        assert_eq!(obj.children().len(), 1);

        let missing = TagConfig::Overlay3d {
            element: "ghost".to_string(),
            position: Vec3::ZERO,
            scale: Vec3::ONE,
        };
        assert!(f.from_config(&missing).is_none());
    }
}
