//! Chunk type catalogues and fixed record layouts

use crate::catalogued_enum;
use crate::structs::{FieldDef, FieldKind, StructLayout};

pub const CHCR_SIGNATURE: &[u8; 4] = b"CrCh";
pub const IVO_SIGNATURE: &[u8; 4] = b"#ivo";

/// Width of the fixed strings in IncludedObjects tables
pub const CHUNK_STR_LEN: usize = 256;

catalogued_enum! {
    /// Chunk types of `CrCh` files
    pub enum ChunkType: u16 {
        Any = 0x0,
        Mesh = 0x1000,
        Helper = 0x1001,
        VertAnim = 0x1002,
        BoneAnim = 0x1003,
        GeomNameList = 0x1004,
        BoneNameList = 0x1005,
        MtlList = 0x1006,
        Mrm = 0x1007,
        SceneProps = 0x1008,
        Light = 0x1009,
        PatchMesh = 0x100A,
        Node = 0x100B,
        Mtl = 0x100C,
        Controller = 0x100D,
        Timing = 0x100E,
        BoneMesh = 0x100F,
        BoneLightBinding = 0x1010,
        MeshMorphTarget = 0x1011,
        BoneInitialPos = 0x1012,
        SourceInfo = 0x1013,
        MtlName = 0x1014,
        ExportFlags = 0x1015,
        DataStream = 0x1016,
        MeshSubsets = 0x1017,
        MeshPhysicsData = 0x1018,
        CompiledBonesSc = 0x2000,
        CompiledPhysicalBonesSc = 0x2001,
        CompiledMorphTargetsSc = 0x2002,
        CompiledPhysicalProxiesSc = 0x2003,
        CompiledIntFacesSc = 0x2004,
        CompiledIntSkinVerticesSc = 0x2005,
        CompiledExt2IntMapSc = 0x2006,
        UnknownSc1 = 0x3004,
        UnknownSc2 = 0x0002,
        CryXmlB = 0x0004,
        AreaShape = 0x000E,
        IncludedObjects = 0x0010,
        Json = 0x0011,
    }
}

catalogued_enum! {
    /// `#ivo` chunk types found in character and skin files
    pub enum CharacterChunkType: u32 {
        Physics = 0x90c687dc,
        BShapesGpu = 0x57a3befd,
        MaterialName = 0x8335674e,
        BShapes = 0x875ccb28,
        SkinInfo = 0x9293b9d8,
        SkinMesh = 0xb875b2d9,
        Skeleton = 0xc201973c,
    }
}

catalogued_enum! {
    /// `#ivo` chunk types found in animation databases
    pub enum DbaChunkType: u32 {
        Skeleton = 0x0000300d,
        DbaData = 0x194fbc50,
        Dba = 0xf7351608,
    }
}

catalogued_enum! {
    /// `#ivo` chunk types found in animation files
    pub enum AimChunkType: u32 {
        Skeleton = 0x1bbc4103,
        BShapes = 0xf5c6eb5b,
    }
}

catalogued_enum! {
    pub enum ChCrVersion: u32 {
        Crytek3_6 = 0x746,
    }
}

catalogued_enum! {
    pub enum IvoVersion: u32 {
        Sc3_11 = 0x900,
    }
}

catalogued_enum! {
    pub enum MtlNameType: u32 {
        Library = 0x01,
        MwoChild = 0x02,
        Unknown2 = 0x04,
        Unknown1 = 0x0B,
        Single = 0x10,
        Child = 0x12,
    }
}

catalogued_enum! {
    pub enum MtlNamePhysicsType: u32 {
        None = 0xFFFFFFFF,
        Default = 0x00000000,
        NoCollide = 0x00000001,
        Obstruct = 0x00000002,
        DefaultProxy = 0x000000FF,
        Unknown = 0x00001100,
    }
}

pub static CHCR_FILE_HEADER: StructLayout = StructLayout::new(
    "ChCrHeader",
    &[
        FieldDef::new("signature", FieldKind::Bytes(4)),
        FieldDef::new("version", FieldKind::U32).with_enums(&[&ChCrVersion::DOMAIN]),
        FieldDef::new("num_chunks", FieldKind::U32),
        FieldDef::new("chunk_table_offset", FieldKind::U32),
    ],
);

pub static IVO_FILE_HEADER: StructLayout = StructLayout::new(
    "IvoHeader",
    &[
        FieldDef::new("signature", FieldKind::Bytes(4)),
        FieldDef::new("version", FieldKind::U32).with_enums(&[&IvoVersion::DOMAIN]),
        FieldDef::new("num_chunks", FieldKind::U32),
        FieldDef::new("chunk_table_offset", FieldKind::U32),
    ],
);

pub static CHCR_CHUNK_HEADER: StructLayout = StructLayout::new(
    "ChunkHeader",
    &[
        FieldDef::new("type", FieldKind::U16).with_enums(&[&ChunkType::DOMAIN]),
        FieldDef::new("version", FieldKind::U16),
        FieldDef::new("id", FieldKind::U32),
        FieldDef::new("size", FieldKind::U32),
        FieldDef::new("offset", FieldKind::U32),
    ],
);

pub static IVO_CHUNK_HEADER: StructLayout = StructLayout::new(
    "IvoChunkHeader",
    &[
        FieldDef::new("type", FieldKind::U32).with_enums(&[
            &CharacterChunkType::DOMAIN,
            &DbaChunkType::DOMAIN,
            &AimChunkType::DOMAIN,
        ]),
        FieldDef::new("version", FieldKind::U32),
        FieldDef::new("offset", FieldKind::U64),
    ],
);

pub static MTL_NAME: StructLayout = StructLayout::new(
    "MtlName",
    &[
        FieldDef::new("name", FieldKind::Str(128)),
        FieldDef::new("num_children", FieldKind::U32),
    ],
);

pub static IVO_MATERIAL_NAME: StructLayout = StructLayout::new(
    "MaterialName900",
    &[FieldDef::new("name", FieldKind::Str(128))],
);

pub static AREA_SHAPE_HEADER: StructLayout = StructLayout::new(
    "AreaShape",
    &[
        FieldDef::new("unknown1", FieldKind::U32),
        FieldDef::new("area_shapes_len", FieldKind::U32),
        FieldDef::new("num_vis_areas", FieldKind::U32),
        FieldDef::new("num_portals", FieldKind::U32),
        FieldDef::new("unknown2", FieldKind::U32),
    ],
);

pub static INCLUDED_OBJECT_TYPE1: StructLayout = StructLayout::new(
    "IncludedObjectType1",
    &[
        FieldDef::new("object_type", FieldKind::U32),
        FieldDef::new("vector1", FieldKind::F64).array(3),
        FieldDef::new("vector2", FieldKind::F64).array(3),
        FieldDef::new("unknown1", FieldKind::U64),
        FieldDef::new("id", FieldKind::U16),
        FieldDef::new("unknown2", FieldKind::U16),
        FieldDef::new("transform", FieldKind::F64).array(12),
        FieldDef::new("unknown3", FieldKind::U64),
    ],
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_sizes() {
        assert_eq!(CHCR_FILE_HEADER.size(), 16);
        assert_eq!(CHCR_CHUNK_HEADER.size(), 16);
        assert_eq!(IVO_CHUNK_HEADER.size(), 16);
        assert_eq!(INCLUDED_OBJECT_TYPE1.size(), 168);
        assert_eq!(AREA_SHAPE_HEADER.size(), 20);
    }

    #[test]
    fn test_catalogue_lookup() {
        assert_eq!(ChunkType::from_raw(0x1014), Some(ChunkType::MtlName));
        assert_eq!(ChunkType::try_from(0x7777u16), Err(0x7777));
        assert_eq!(MtlNamePhysicsType::from_raw(0xFFFFFFFF), Some(MtlNamePhysicsType::None));
        assert_eq!(DbaChunkType::DOMAIN.lookup(0xf7351608), Some("Dba"));
    }
}
