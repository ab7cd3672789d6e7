pub mod core;
pub mod index;
pub mod journal;
pub mod query;
pub mod storage;

/*
┌──────────────────────────────────────────────────────────────────────────┐
│                        PADDOCK STRUCT ARCHITECTURE                        │
└──────────────────────────────────────────────────────────────────────────┘

┌───────────────────────────────── FACADE ─────────────────────────────────┐
│                                                                           │
│  ┌─────────────────────────────┐   ┌───────────────────────────────────┐ │
│  │ struct Db                   │   │ struct Collection                 │ │
│  │ • root: PathBuf             │──▶│ • journal: Journal                │ │
│  │ • config: Config            │   │ • indexes: IndexRegistry          │ │
│  │ • collections:              │   │ • resident: Vec<Slot>             │ │
│  │   HashMap<String,Collection>│   │ • resident_start: BlockIndex      │ │
│  └─────────────────────────────┘   │ • total_blocks: u64               │ │
│                                    └───────────────────────────────────┘ │
└───────────────────────────────────────────────────────────────────────────┘

┌────────────────────────────── JOURNAL LAYER ─────────────────────────────┐
│                                                                           │
│  ┌────────────────────────────────────┐   ┌─────────────────────────────┐│
│  │ struct Journal                     │   │ struct BlockCache           ││
│  │ • insert_queue: VecDeque<Document> │──▶│ • cache:                    ││
│  │ • update_queue: VecDeque<Document> │   │   LruCache<BlockIndex,      ││
│  │ • free_blocks: VecDeque<BlockIndex>│   │   (Document, Instant)>      ││
│  │ • window: WindowState              │   │ • max_age: Duration         ││
│  │ • last_flush: Instant              │   │ • hit/miss counters         ││
│  └────────────────────────────────────┘   └─────────────────────────────┘│
└───────────────────────────────────────────────────────────────────────────┘

┌────────────────────────────── STORAGE LAYER ─────────────────────────────┐
│                                                                           │
│  ┌──────────────────────────┐  ┌──────────────────────────────────────┐  │
│  │ struct BlockStore        │  │ struct PartitionSet                  │  │
│  │ • partitions:PartitionSet│─▶│ • paths: Vec<PathBuf> (.db, .db1 …)  │  │
│  │ • codec: BlockCodec      │  │ • sizes: Vec<u64>                    │  │
│  │ • page_size: usize       │  └──────────────────────────────────────┘  │
│  └──────────────────────────┘                                            │
│              one document per fixed-size, right-padded block             │
└───────────────────────────────────────────────────────────────────────────┘

┌─────────────────────────────── INDEX LAYER ──────────────────────────────┐
│                                                                           │
│  ┌───────────────────────────┐  ┌──────────────────────────────────────┐ │
│  │ struct IndexRegistry      │  │ struct KdvSet                        │ │
│  │ • indices:                │─▶│ • set: HashMap<IndexKey,             │ │
│  │   HashMap<String, KdvSet> │  │   Vec<BlockIndex>>                   │ │
│  └───────────────────────────┘  │ • deep: usize                        │ │
│                                 └──────────────────────────────────────┘ │
└───────────────────────────────────────────────────────────────────────────┘
*/
