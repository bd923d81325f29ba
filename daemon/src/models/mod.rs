macro_rules! import_models {
    ($x:ident) => {
        mod $x;
        pub use self::$x::*;
    };
}

import_models!(build_farm_job);
import_models!(builder);
import_models!(queue);
