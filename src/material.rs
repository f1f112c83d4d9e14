// material.rs — mesh and sprite materials

use crate::dispose::Disposable;
use crate::texture::Texture;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Side {
    #[default]
    Front,
    Back,
    Double,
}

/// The texture slots a material may carry. All of them are released with the material.
#[derive(Debug, Clone, Default)]
pub struct MaterialMaps {
    pub map: Option<Texture>,
    pub light_map: Option<Texture>,
    pub bump_map: Option<Texture>,
    pub normal_map: Option<Texture>,
    pub specular_map: Option<Texture>,
}

impl MaterialMaps {
    pub fn iter(&self) -> impl Iterator<Item = &Texture> {
        [
            &self.map,
            &self.light_map,
            &self.bump_map,
            &self.normal_map,
            &self.specular_map,
        ]
        .into_iter()
        .flatten()
    }

    fn dispose_all(&mut self) {
        for slot in [
            &mut self.map,
            &mut self.light_map,
            &mut self.bump_map,
            &mut self.normal_map,
            &mut self.specular_map,
        ] {
            if let Some(t) = slot.as_mut() {
                t.dispose();
            }
        }
    }
}

/// Unlit material: texture times color.
#[derive(Debug, Clone)]
pub struct MeshBasicMaterial {
    pub maps: MaterialMaps,
    pub color: [f32; 4],
    pub side: Side,
    disposed: bool,
}

impl MeshBasicMaterial {
    pub fn new(map: Option<Texture>, side: Side) -> Self {
        Self {
            maps: MaterialMaps { map, ..Default::default() },
            color: [1.0; 4],
            side,
            disposed: false,
        }
    }
}

impl Disposable for MeshBasicMaterial {
    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.maps.dispose_all();
        self.disposed = true;
    }

    fn is_disposed(&self) -> bool {
        self.disposed
    }
}

/// Billboard material. `rotation` rolls the sprite around the view axis, in radians.
#[derive(Debug, Clone)]
pub struct SpriteMaterial {
    pub map: Option<Texture>,
    pub rotation: f32,
    pub color: [f32; 4],
    disposed: bool,
}

impl SpriteMaterial {
    pub fn new(map: Texture, rotation: f32) -> Self {
        Self {
            map: Some(map),
            rotation,
            color: [1.0; 4],
            disposed: false,
        }
    }
}

impl Disposable for SpriteMaterial {
    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        if let Some(t) = self.map.as_mut() {
            t.dispose();
        }
        self.disposed = true;
    }

    fn is_disposed(&self) -> bool {
        self.disposed
    }
}

#[derive(Debug, Clone)]
pub enum MeshMaterials {
    Single(MeshBasicMaterial),
    Multi(Vec<MeshBasicMaterial>),
}

impl MeshMaterials {
    pub fn get(&self, index: usize) -> Option<&MeshBasicMaterial> {
        match self {
            MeshMaterials::Single(m) => (index == 0).then_some(m),
            MeshMaterials::Multi(v) => v.get(index),
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MeshBasicMaterial> {
        match self {
            MeshMaterials::Single(m) => std::slice::from_ref(m).iter(),
            MeshMaterials::Multi(v) => v.iter(),
        }
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, MeshBasicMaterial> {
        match self {
            MeshMaterials::Single(m) => std::slice::from_mut(m).iter_mut(),
            MeshMaterials::Multi(v) => v.iter_mut(),
        }
    }
}
